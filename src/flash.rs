//! One-shot messages carried to the next page view.
//!
//! Messages are queued in a dedicated session. Reading them with
//! [`Flasher::get_flashes`] expires that session, so each message is shown
//! at most once.

use crate::dispatcher::{Request, Response};
use crate::session::SessionStore;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Session holding the flash queues.
pub const SESSION_FLASH: &str = "session_flash";
pub const FLASH_ERROR: &str = "flasherror";
pub const FLASH_SUCCESS: &str = "flashsuccess";

/// Messages read by [`Flasher::get_flashes`], each queue oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Flashes {
    pub errors: Vec<String>,
    pub successes: Vec<String>,
}

impl Flashes {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.successes.is_empty()
    }
}

/// Queues and reads flash messages through a [`SessionStore`].
///
/// Store failures never reach the caller: a message that cannot be saved
/// is logged and dropped, and an unreadable flash session reads as empty.
#[derive(Clone)]
pub struct Flasher {
    store: Arc<dyn SessionStore>,
}

impl Flasher {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn set_error_flash(&self, req: &mut Request, res: &mut Response, message: &str) {
        self.set_flash(req, res, FLASH_ERROR, message);
    }

    pub fn set_success_flash(&self, req: &mut Request, res: &mut Response, message: &str) {
        self.set_flash(req, res, FLASH_SUCCESS, message);
    }

    fn set_flash(&self, req: &mut Request, res: &mut Response, key: &str, message: &str) {
        let mut session = match self.store.get(req, SESSION_FLASH) {
            Ok(session) => session,
            Err(e) => {
                warn!(request_id = %req.request_id, error = %e, "flash session unavailable");
                return;
            }
        };
        session.add_flash(key, message);
        if let Err(e) = self.store.save(req, res, &session) {
            warn!(request_id = %req.request_id, error = %e, "failed to save flash message");
        }
    }

    /// Take both queues and expire the flash session.
    pub fn get_flashes(&self, req: &mut Request, res: &mut Response) -> Flashes {
        let mut session = match self.store.get(req, SESSION_FLASH) {
            Ok(session) => session,
            Err(e) => {
                warn!(request_id = %req.request_id, error = %e, "flash session unavailable");
                return Flashes::default();
            }
        };
        let errors = to_strings(session.flashes(FLASH_ERROR));
        let successes = to_strings(session.flashes(FLASH_SUCCESS));
        session.options.max_age = -1;
        if let Err(e) = self.store.save(req, res, &session) {
            warn!(request_id = %req.request_id, error = %e, "failed to expire flash session");
        }
        Flashes { errors, successes }
    }
}

fn to_strings(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;
    use http::Method;

    #[test]
    fn test_flashes_read_once_within_request() {
        let flasher = Flasher::new(Arc::new(MemoryStore::new()));
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();

        flasher.set_error_flash(&mut req, &mut res, "bad");
        flasher.set_success_flash(&mut req, &mut res, "good");
        flasher.set_error_flash(&mut req, &mut res, "worse");

        let flashes = flasher.get_flashes(&mut req, &mut res);
        assert_eq!(flashes.errors, vec!["bad", "worse"]);
        assert_eq!(flashes.successes, vec!["good"]);
        assert!(flasher.get_flashes(&mut req, &mut res).is_empty());
    }
}
