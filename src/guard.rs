use std::sync::Arc;

use dashmap::DashSet;

/// Rejects a second submission of the same form while the first is still in
/// flight. Keys are per user and per action, e.g. `"{user}:experience:new"`.
#[derive(Debug, Clone, Default)]
pub struct SubmitGuard {
    in_flight: Arc<DashSet<String>>,
}

/// Held for the duration of one submission; dropping it frees the key.
#[derive(Debug)]
pub struct SubmitTicket {
    key: String,
    in_flight: Arc<DashSet<String>>,
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, key: impl Into<String>) -> Option<SubmitTicket> {
        let key = key.into();
        if !self.in_flight.insert(key.clone()) {
            log::debug!("Submission {key} already in flight");
            return None;
        }
        Some(SubmitTicket {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

impl Drop for SubmitTicket {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_submission_is_rejected_until_first_finishes() {
        let guard = SubmitGuard::new();
        let ticket = guard.try_acquire("u1:signup").unwrap();
        assert!(guard.try_acquire("u1:signup").is_none());
        assert!(guard.try_acquire("u2:signup").is_some());

        drop(ticket);
        assert!(guard.try_acquire("u1:signup").is_some());
    }
}
