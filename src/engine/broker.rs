//! Hand-off between a script waiting on `prompt` and the human typing.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use super::session::SessionId;

/// What a parked prompt eventually receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputReply {
    Value(String),
    /// The run was superseded while waiting.
    Cancelled,
}

/// A parked prompt. Resolved exactly once.
#[derive(Debug)]
pub struct InputRequest {
    pub session: SessionId,
    pub prompt: String,
    resolve: oneshot::Sender<InputReply>,
}

impl InputRequest {
    fn resolve(self, reply: InputReply) {
        // The waiter may already be gone if its run was dropped.
        let _ = self.resolve.send(reply);
    }
}

#[derive(Debug)]
pub enum Acquire {
    /// Served from the pre-fill queue without suspending.
    Ready(String),
    Wait(oneshot::Receiver<InputReply>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Resolved(SessionId),
    Queued,
}

#[derive(Debug, Default)]
pub struct InputBroker {
    pending: Option<InputRequest>,
    prefill: VecDeque<String>,
}

impl InputBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a queued reply, or park a new request.
    ///
    /// Returns `None` when a request is already pending; callers surface that
    /// as an error in the script.
    pub fn request(&mut self, session: SessionId, prompt: impl Into<String>) -> Option<Acquire> {
        if let Some(value) = self.prefill.pop_front() {
            return Some(Acquire::Ready(value));
        }
        if self.pending.is_some() {
            return None;
        }
        let (resolve, wait) = oneshot::channel();
        self.pending = Some(InputRequest { session, prompt: prompt.into(), resolve });
        Some(Acquire::Wait(wait))
    }

    /// Resolve the pending request or queue the value. Never blocks.
    pub fn submit(&mut self, value: impl Into<String>) -> Submitted {
        let value = value.into();
        match self.pending.take() {
            Some(request) => {
                let session = request.session;
                request.resolve(InputReply::Value(value));
                Submitted::Resolved(session)
            }
            None => {
                self.prefill.push_back(value);
                Submitted::Queued
            }
        }
    }

    /// Resolve the pending request with [`InputReply::Cancelled`] and drop
    /// every queued value.
    pub fn cancel_all(&mut self) {
        if let Some(request) = self.pending.take() {
            request.resolve(InputReply::Cancelled);
        }
        self.prefill.clear();
    }

    /// Release a request left behind by a run that has ended.
    pub fn release(&mut self, session: SessionId) {
        if self.pending.as_ref().is_some_and(|r| r.session == session) {
            if let Some(request) = self.pending.take() {
                request.resolve(InputReply::Cancelled);
            }
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_prompt(&self) -> Option<&str> {
        self.pending.as_ref().map(|r| r.prompt.as_str())
    }

    pub fn queued(&self) -> impl Iterator<Item = &str> {
        self.prefill.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_values_are_served_first_in_order() {
        let mut broker = InputBroker::new();
        assert_eq!(broker.submit("a"), Submitted::Queued);
        assert_eq!(broker.submit("b"), Submitted::Queued);
        assert!(matches!(broker.request(SessionId(1), "?"), Some(Acquire::Ready(v)) if v == "a"));
        assert_eq!(broker.queued().collect::<Vec<_>>(), ["b"]);
        assert!(!broker.is_waiting());
    }

    #[tokio::test]
    async fn submit_resolves_the_pending_request() {
        let mut broker = InputBroker::new();
        let Some(Acquire::Wait(wait)) = broker.request(SessionId(7), "name?") else {
            panic!("expected to wait");
        };
        assert_eq!(broker.pending_prompt(), Some("name?"));
        assert!(broker.request(SessionId(7), "again?").is_none());
        assert_eq!(broker.submit("x"), Submitted::Resolved(SessionId(7)));
        assert_eq!(wait.await.unwrap(), InputReply::Value("x".into()));
        assert!(!broker.is_waiting());
    }

    #[tokio::test]
    async fn cancel_all_releases_the_waiter_and_empties_the_queue() {
        let mut broker = InputBroker::new();
        let Some(Acquire::Wait(wait)) = broker.request(SessionId(1), "?") else {
            panic!("expected to wait");
        };
        broker.cancel_all();
        assert_eq!(wait.await.unwrap(), InputReply::Cancelled);

        broker.submit("late");
        broker.cancel_all();
        assert_eq!(broker.queued().count(), 0);
    }

    #[test]
    fn release_ignores_other_sessions() {
        let mut broker = InputBroker::new();
        let _wait = broker.request(SessionId(2), "?");
        broker.release(SessionId(1));
        assert!(broker.is_waiting());
        broker.release(SessionId(2));
        assert!(!broker.is_waiting());
    }
}
