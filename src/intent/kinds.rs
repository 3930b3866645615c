//! Typed intent payloads understood by the host.
//!
//! Every type implements [`Intent`], so extension logic can write
//! `ctx.send_intent(DialogIntent::question(..))` instead of assembling JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::IntentKind;
use crate::types::Result;

/// Something that can be launched as an intent.
pub trait Intent {
    fn kind(&self) -> IntentKind;

    fn into_payload(self) -> Result<Value>;
}

/// Untyped intent, for kinds this crate has no struct for.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIntent {
    pub kind: IntentKind,
    pub payload: Value,
}

impl Intent for RawIntent {
    fn kind(&self) -> IntentKind {
        self.kind.clone()
    }

    fn into_payload(self) -> Result<Value> {
        Ok(self.payload)
    }
}

/// Ask the user to fill a form described by a JSON schema.
/// The reply is the object the user submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersIntent {
    pub schema: Value,
}

impl ParametersIntent {
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }
}

/// Where the host renders a [`UiIntent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiAnchor {
    Modal,
    Sidebar,
    Window,
}

/// Open a web page inside the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiIntent {
    pub anchor: UiAnchor,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogType {
    Info,
    Question,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogButtons {
    pub yes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<String>,
}

/// Modal dialog. The reply is `true` when the "yes" button was clicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogIntent {
    #[serde(rename = "type")]
    pub dialog_type: DialogType,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub buttons: DialogButtons,
}

impl DialogIntent {
    pub fn question(
        title: impl Into<String>,
        description: impl Into<String>,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self {
        Self {
            dialog_type: DialogType::Question,
            title: title.into(),
            description: description.into(),
            details: None,
            buttons: DialogButtons {
                yes: yes.into(),
                no: Some(no.into()),
            },
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            dialog_type: DialogType::Error,
            title: title.into(),
            description: description.into(),
            details: None,
            buttons: DialogButtons {
                yes: "OK".to_string(),
                no: None,
            },
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub image_id: String,
}

/// Display a set of images, typically the output of an image command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesIntent {
    pub images: Vec<ImageRef>,
    pub title: String,
    pub description: String,
}

impl ImagesIntent {
    pub fn new<I, S>(image_ids: I, title: impl Into<String>, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            images: image_ids
                .into_iter()
                .map(|id| ImageRef { image_id: id.into() })
                .collect(),
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShowType {
    ExtensionSettings,
    Image,
    Repository,
}

/// Navigate the host UI to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowIntent {
    #[serde(rename = "type")]
    pub show_type: ShowType,
    pub id: String,
}

macro_rules! typed_intent {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl Intent for $ty {
                fn kind(&self) -> IntentKind {
                    IntentKind::$kind
                }

                fn into_payload(self) -> Result<Value> {
                    Ok(serde_json::to_value(self)?)
                }
            }
        )+
    };
}

typed_intent! {
    ParametersIntent => Parameters,
    UiIntent => Ui,
    DialogIntent => Dialog,
    ImagesIntent => Images,
    ShowIntent => Show,
}
