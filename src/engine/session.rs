use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tokio::task::AbortHandle;

/// Opaque per-run token. A callback holding a stale id is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    AwaitingInput,
    Halted,
    Completed,
    Failed,
}

impl SessionState {
    /// `Running` or `AwaitingInput`.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running | SessionState::AwaitingInput)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Halted | SessionState::Completed | SessionState::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::AwaitingInput => "awaiting input",
            SessionState::Halted => "halted",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outstanding timer tasks of one session.
#[derive(Debug, Default)]
pub struct TimerSet {
    handles: HashMap<u32, AbortHandle>,
}

impl TimerSet {
    pub fn insert(&mut self, id: u32, handle: AbortHandle) {
        self.handles.insert(id, handle);
    }

    /// Cancel a single timer. Returns false for unknown ids.
    pub fn cancel(&mut self, id: u32) -> bool {
        match self.handles.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drop a timer without aborting its task, e.g. after its last firing.
    pub fn forget(&mut self, id: u32) -> bool {
        self.handles.remove(&id).is_some()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.handles.len();
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// One run of one script.
#[derive(Debug)]
pub struct ExecutionSession {
    pub id: SessionId,
    pub state: SessionState,
    pub source: Rc<str>,
    pub timers: TimerSet,
}

impl ExecutionSession {
    pub fn new(id: SessionId, source: Rc<str>) -> Self {
        Self { id, state: SessionState::Running, source, timers: TimerSet::default() }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_aborts_known_timers_only() {
        let mut timers = TimerSet::default();
        let task = tokio::spawn(std::future::pending::<()>());
        timers.insert(1, task.abort_handle());

        assert!(!timers.cancel(2));
        assert!(timers.cancel(1));
        assert!(timers.is_empty());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn terminal_states_are_not_active() {
        assert!(SessionState::AwaitingInput.is_active());
        assert!(!SessionState::Halted.is_active());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }
}
