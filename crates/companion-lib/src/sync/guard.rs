//! Single-flight guard for outbound sync requests

use std::sync::{Arc, Mutex, PoisonError};

/// Mutex-protected in-flight flag.
///
/// At most one `InFlightToken` exists at a time. The flag is cleared when the
/// token is dropped.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    flag: Arc<Mutex<bool>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare-and-set false -> true. Returns `None` if a request is already
    /// in flight.
    pub fn try_acquire(&self) -> Option<InFlightToken> {
        let mut in_flight = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        if *in_flight {
            return None;
        }
        *in_flight = true;
        Some(InFlightToken {
            flag: Arc::clone(&self.flag),
        })
    }

    pub fn is_held(&self) -> bool {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of an outstanding request; releases the guard on drop
#[derive(Debug)]
pub struct InFlightToken {
    flag: Arc<Mutex<bool>>,
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        *self.flag.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}
