//! Host intents: correlation of requests/replies and typed intent payloads.

mod correlator;
pub mod kinds;

pub use correlator::{IntentCorrelator, IntentStats};
pub use kinds::{
    DialogButtons, DialogIntent, DialogType, ImageRef, ImagesIntent, Intent, ParametersIntent,
    RawIntent, ShowIntent, ShowType, UiAnchor, UiIntent,
};
