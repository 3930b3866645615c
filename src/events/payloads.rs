use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of `image.created`, `image.updated`, `image.deleted` and the
/// `image.compute*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEvent {
    pub id: String,
}

/// Payload of `image.runCommand`: a command applied to a selection of images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCommand {
    pub command_id: String,
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub parameters: Value,
}

/// Payload of `process.runCommand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCommand {
    pub command_id: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ProcessCommand {
    /// String parameter `name`, if present.
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }
}

/// Payload of `text.computeEmbeddings`; the handler answers with a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEmbeddingsRequest {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Event, EventKind};
    use serde_json::json;

    #[test]
    fn test_image_command_decodes_camel_case() {
        let event = Event::new(
            EventKind::ImageRunCommand,
            json!({
                "commandId": "convert",
                "imageIds": ["img-1", "img-2"],
                "parameters": {"format": "PNG", "stripMetadata": true},
            }),
        );
        let command: ImageCommand = event.decode().unwrap();
        assert_eq!(command.command_id, "convert");
        assert_eq!(command.image_ids, vec!["img-1", "img-2"]);
        assert_eq!(command.parameters["stripMetadata"], json!(true));
    }

    #[test]
    fn test_process_command_without_parameters() {
        let event = Event::new(EventKind::ProcessRunCommand, json!({"commandId": "dialog"}));
        let command: ProcessCommand = event.decode().unwrap();
        assert_eq!(command.command_id, "dialog");
        assert_eq!(command.parameters, Value::Null);
        assert!(command.str_param("type").is_none());
    }

    #[test]
    fn test_image_event_requires_id() {
        let event = Event::new(EventKind::ImageDeleted, json!({}));
        assert!(event.decode::<ImageEvent>().is_err());
    }
}
