//! Pairing prompt: where the pairing URI is shown and how the user cancels
//!
//! The QR modal itself is UI. The connector only needs to hand it a URI and
//! learn when it was dismissed without a session.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

#[async_trait]
pub trait PairingPrompt: Send + Sync {
    /// Present the pairing URI (QR code, deep link).
    async fn open(&self, uri: &str);

    /// Resolves once the user dismisses the prompt.
    async fn closed(&self);

    /// Hide the prompt after approval.
    async fn close(&self);
}

/// Prompt driven from another task through a [`PromptHandle`].
#[derive(Debug)]
pub struct ChannelPrompt {
    shown: watch::Sender<Option<String>>,
    dismissed: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Clone)]
pub struct PromptHandle {
    shown: watch::Receiver<Option<String>>,
    dismissed: Arc<watch::Sender<bool>>,
}

impl ChannelPrompt {
    pub fn new() -> (Self, PromptHandle) {
        let (shown, shown_rx) = watch::channel(None);
        let (dismissed, _) = watch::channel(false);
        let dismissed = Arc::new(dismissed);
        (Self { shown, dismissed: dismissed.clone() }, PromptHandle { shown: shown_rx, dismissed })
    }
}

#[async_trait]
impl PairingPrompt for ChannelPrompt {
    async fn open(&self, uri: &str) {
        self.dismissed.send_replace(false);
        self.shown.send_replace(Some(uri.to_string()));
    }

    async fn closed(&self) {
        let mut rx = self.dismissed.subscribe();
        let _ = rx.wait_for(|dismissed| *dismissed).await;
    }

    async fn close(&self) {
        self.shown.send_replace(None);
        self.dismissed.send_replace(false);
    }
}

impl PromptHandle {
    /// Waits until a URI is on display.
    pub async fn uri(&mut self) -> Option<String> {
        self.shown.wait_for(Option::is_some).await.ok().and_then(|uri| uri.clone())
    }

    pub fn current(&self) -> Option<String> { self.shown.borrow().clone() }

    /// The user closes the modal.
    pub fn dismiss(&self) {
        self.dismissed.send_replace(true);
    }
}
