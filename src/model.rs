use crate::caption::{CaptionMode, ImageSource};

/// Events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    CaptionStarted {
        source: ImageSource,
        mode: CaptionMode,
    },
    CaptionCompleted {
        prompt: String,
    },
    CaptionFailed {
        // Kept separate so the UI can show the "no image" dialog verbatim.
        no_image: bool,
        message: String,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the controller.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    CaptionBusy,
    ModelReady { model: String },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::CaptionBusy => "A caption is already running".to_string(),
            InfoEvent::ModelReady { model } => format!("Model {} ready", model),
        }
    }
}
