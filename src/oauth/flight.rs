use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Keys with an operation in progress. At most one per key.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if it is already claimed.
    pub fn try_acquire(&self, key: &str) -> Option<FlightPermit> {
        let mut active = self.active.lock().ok()?;
        if !active.insert(key.to_string()) {
            return None;
        }
        Some(FlightPermit {
            active: self.active.clone(),
            key: key.to_string(),
        })
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(key))
            .unwrap_or(false)
    }
}

/// Releases its key when dropped, on every exit path.
#[derive(Debug)]
pub struct FlightPermit {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl FlightPermit {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.key);
        }
    }
}
