//! Terminal stand-in for a browser popup.
//!
//! The authorization URL is printed for the user to open. Pressing Enter
//! counts as closing the popup.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::auth::error::AuthError;
use crate::oauth::{PopupOpener, PopupRequest, PopupWindow};

#[derive(Debug, Default)]
pub struct TerminalPopup {
    closed: AtomicBool,
}

impl PopupWindow for TerminalPopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPopupOpener;

impl PopupOpener for TerminalPopupOpener {
    fn open(&self, request: &PopupRequest) -> Result<Arc<dyn PopupWindow>, AuthError> {
        println!("🔗 Open this URL to continue: {}", request.url);
        println!("⏎  Press Enter to cancel");

        let popup = Arc::new(TerminalPopup::default());
        let watched = popup.clone();
        std::thread::Builder::new()
            .name("quillpad-popup".to_string())
            .spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().lock().read_line(&mut line);
                watched.close();
            })?;
        Ok(popup)
    }
}
