use std::sync::{Arc, Mutex};

use crate::auth::error::AuthError;

/// Window name and size used for provider popups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub url: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl PopupRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: "oauth".to_string(),
            width: 600,
            height: 800,
        }
    }

    /// `width=..,height=..` feature string for `window.open`-style hosts.
    pub fn features(&self) -> String {
        format!("width={},height={}", self.width, self.height)
    }
}

/// A window showing the identity provider's consent page.
pub trait PopupWindow: Send + Sync {
    /// Whether the user (or anything else) has closed the window.
    fn is_closed(&self) -> bool;

    /// Close the window. Closing twice is harmless.
    fn close(&self);
}

/// Host capability for opening popups.
pub trait PopupOpener: Send + Sync {
    fn open(&self, request: &PopupRequest) -> Result<Arc<dyn PopupWindow>, AuthError>;
}

/// Holds the popup of one attempt once the handshake opens it.
#[derive(Clone, Default)]
pub(crate) struct PopupSlot {
    inner: Arc<Mutex<Option<Arc<dyn PopupWindow>>>>,
}

impl PopupSlot {
    pub(crate) fn set(&self, popup: Arc<dyn PopupWindow>) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(popup);
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<dyn PopupWindow>> {
        self.inner.lock().ok().and_then(|slot| slot.clone())
    }

    /// Close and forget the popup, if any.
    pub(crate) fn close(&self) {
        let popup = self.inner.lock().ok().and_then(|mut slot| slot.take());
        if let Some(popup) = popup {
            if !popup.is_closed() {
                popup.close();
            }
        }
    }
}
