//! Redispatch from the camera worker to the UI-affine context.
//!
//! The worker never touches views. It posts [`UiEvent`]s into an unbounded
//! channel; the UI side drains them on its own thread or task. Everything
//! crossing this boundary is an owned snapshot.

use crate::errors::{ErrorKind, RangefinderError};
use crate::session::SessionState;
use crate::storage::SavedCapture;
use crate::types::{CameraMode, Measurement};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error(ErrorKind),
}

/// A user-visible notification (toast, status line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusIndicator {
    /// Show at full opacity, cancelling any running fade.
    Show,
    FadeOut { delay_ms: u64, duration_ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    DistanceUpdated(Measurement),
    FocusIndicator(FocusIndicator),
    /// Capture control disabled while true.
    CaptureInProgress(bool),
    CaptureSaved(SavedCapture),
    Message(UserMessage),
    ModeChanged {
        mode: CameraMode,
        zoom_presets_visible: bool,
    },
    FlashChanged(bool),
    SessionStateChanged(SessionState),
}

/// Worker-side handle for posting UI events.
#[derive(Debug, Clone)]
pub struct UiDispatcher {
    sender: mpsc::UnboundedSender<UiEvent>,
}

impl UiDispatcher {
    pub fn dispatch(&self, event: UiEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("UI receiver dropped, event discarded");
        }
    }

    pub fn error(&self, error: &RangefinderError) {
        log::error!("{}", error);
        self.dispatch(UiEvent::Message(UserMessage {
            level: MessageLevel::Error(error.kind()),
            text: error.user_message(),
        }));
    }

    pub fn warning(&self, text: impl Into<String>) {
        let text = text.into();
        log::warn!("{}", text);
        self.dispatch(UiEvent::Message(UserMessage {
            level: MessageLevel::Warning,
            text,
        }));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.dispatch(UiEvent::Message(UserMessage {
            level: MessageLevel::Info,
            text: text.into(),
        }));
    }
}

/// UI-side end of the redispatch channel.
#[derive(Debug)]
pub struct UiEventReceiver {
    receiver: mpsc::UnboundedReceiver<UiEvent>,
}

impl UiEventReceiver {
    /// Wait for the next event; `None` once every dispatcher is gone.
    pub async fn recv(&mut self) -> Option<UiEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UiEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn channel() -> (UiDispatcher, UiEventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (UiDispatcher { sender }, UiEventReceiver { receiver })
}
