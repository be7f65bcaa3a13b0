use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::broker::{InputBroker, Submitted};
use super::error::ScriptError;
use super::sandbox::{Sandbox, TimerEvent};
use super::session::{ExecutionSession, SessionId, SessionState};
use super::transcript::{LineKind, OutputLine, Transcript, TranscriptCursor};
use super::{EngineConfig, EngineStatus};
use crate::script;

pub(crate) type Shared = Rc<RefCell<EngineCore>>;

/// State shared by the controller, the sandbox natives and the timer tasks.
///
/// Never borrowed across an `.await`.
pub(crate) struct EngineCore {
    pub(crate) transcript: Transcript,
    pub(crate) broker: InputBroker,
    pub(crate) current: Option<ExecutionSession>,
    pub(crate) config: EngineConfig,
    next_id: u64,
    status: watch::Sender<EngineStatus>,
}

impl EngineCore {
    pub(crate) fn is_live(&self, id: SessionId) -> bool {
        self.current.as_ref().is_some_and(|s| s.id == id && s.is_active())
    }

    pub(crate) fn session_mut(&mut self, id: SessionId) -> Option<&mut ExecutionSession> {
        self.current.as_mut().filter(|s| s.id == id)
    }

    pub(crate) fn set_state(&mut self, id: SessionId, state: SessionState) {
        if let Some(session) = self.session_mut(id) {
            session.state = state;
        }
        self.publish();
    }

    pub(crate) fn publish(&self) {
        let status = EngineStatus {
            session: self.current.as_ref().map(|s| s.id),
            state: self.current.as_ref().map(|s| s.state).unwrap_or_default(),
            prompt: self.broker.pending_prompt().map(str::to_string),
        };
        self.status.send_replace(status);
    }

    /// Append on behalf of a session; dropped once the session is superseded.
    pub(crate) fn emit(&mut self, id: SessionId, kind: LineKind, text: impl Into<String>) {
        if self.is_live(id) {
            self.transcript.push(kind, text);
        }
    }
}

/// Owns the lifecycle of runs: start, supersede, reset.
///
/// Runs are spawned with [`tokio::task::spawn_local`], so every method that
/// starts one must be called from inside a [`tokio::task::LocalSet`].
#[derive(Clone)]
pub struct ExecutionController {
    core: Shared,
}

impl ExecutionController {
    pub fn new(config: EngineConfig) -> Self {
        let (status, _) = watch::channel(EngineStatus::default());
        let core = EngineCore {
            transcript: Transcript::new(config.mirror_transcript),
            broker: InputBroker::new(),
            current: None,
            config,
            next_id: 0,
            status,
        };
        Self { core: Rc::new(RefCell::new(core)) }
    }

    /// Supersede any active run and start `source`. Returns immediately.
    pub fn start(&self, source: impl Into<String>) -> SessionId {
        let superseded = self.supersede();
        let mut core = self.core.borrow_mut();
        core.next_id += 1;
        let id = SessionId(core.next_id);
        let source: Rc<str> = Rc::from(source.into());
        core.current = Some(ExecutionSession::new(id, source.clone()));
        core.transcript.push(LineKind::System, "Running program...");
        core.publish();
        info!(session = %id, bytes = source.len(), "starting run");

        let grace = superseded.then_some(core.config.grace_delay);
        drop(core);
        tokio::task::spawn_local(drive(self.core.clone(), id, source, grace));
        id
    }

    /// Halt the active run, if any: cancel its timers and release its input
    /// wait. Returns whether a run was halted.
    pub fn supersede(&self) -> bool {
        let mut core = self.core.borrow_mut();
        let Some(session) = core.current.as_mut().filter(|s| s.is_active()) else {
            return false;
        };
        session.state = SessionState::Halted;
        let id = session.id;
        let timers = session.timers.cancel_all();
        core.broker.cancel_all();
        core.publish();
        debug!(session = %id, timers, "superseded run");
        true
    }

    /// Supersede, then clear the transcript and the pre-fill queue.
    pub fn reset(&self) {
        self.supersede();
        let mut core = self.core.borrow_mut();
        core.broker.cancel_all();
        core.current = None;
        core.transcript.clear();
        core.transcript.push(LineKind::Debug, "// Output cleared");
        core.publish();
        debug!("transcript reset");
    }

    /// Deliver a reply to the pending prompt, or queue it when none is pending.
    pub fn submit_input(&self, value: impl Into<String>) {
        let value = value.into();
        let mut core = self.core.borrow_mut();
        match core.broker.submit(value.clone()) {
            Submitted::Resolved(id) => {
                core.transcript.push(LineKind::EchoInput, value);
                if let Some(session) = core.session_mut(id).filter(|s| s.state == SessionState::AwaitingInput) {
                    session.state = SessionState::Running;
                }
            }
            Submitted::Queued => {
                core.transcript.push(LineKind::Debug, format!("// queued input: {value}"));
            }
        }
        core.publish();
    }

    pub fn status(&self) -> EngineStatus {
        self.core.borrow().status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.core.borrow().status.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.core.borrow().current.as_ref().map(|s| s.id)
    }

    pub fn pending_prompt(&self) -> Option<String> {
        self.core.borrow().broker.pending_prompt().map(str::to_string)
    }

    pub fn transcript(&self) -> Vec<OutputLine> {
        self.core.borrow().transcript.lines().to_vec()
    }

    /// Lines appended since the cursor last read, and whether a reset happened.
    pub fn read_transcript(&self, cursor: &mut TranscriptCursor) -> (bool, Vec<OutputLine>) {
        let core = self.core.borrow();
        let read = cursor.read(&core.transcript);
        (read.reset, read.lines.to_vec())
    }

    /// Wait until the current run is no longer `Running`: it awaits input,
    /// has ended, or nothing was started.
    pub async fn settled(&self) -> EngineStatus {
        let mut status = self.subscribe();
        let result = status.wait_for(|s| s.state != SessionState::Running).await.map(|s| (*s).clone());
        result.unwrap_or_else(|_| self.status())
    }
}

/// Body of a spawned run.
async fn drive(core: Shared, id: SessionId, source: Rc<str>, grace: Option<Duration>) {
    if let Some(grace) = grace {
        tokio::time::sleep(grace).await;
    }
    if !core.borrow().is_live(id) {
        debug!(session = %id, "run superseded before evaluation");
        return;
    }

    let program = match script::parse(&source) {
        Ok(program) => program,
        Err(err) => {
            finish(&core, id, Err(err));
            return;
        }
    };

    let (events_tx, events) = mpsc::unbounded_channel();
    let sandbox = Sandbox::new(core.clone(), id, events_tx);
    let outcome = run_to_completion(&core, id, &sandbox, &program, events).await;
    finish(&core, id, outcome);
    sandbox.teardown();
}

/// Evaluate the main body, then keep the session alive until its timers
/// are gone. A failing timer callback ends the run at once.
async fn run_to_completion(
    core: &Shared,
    id: SessionId,
    sandbox: &Sandbox,
    program: &script::ast::Program,
    mut events: mpsc::UnboundedReceiver<TimerEvent>,
) -> Result<(), ScriptError> {
    let mut status = core.borrow().status.subscribe();

    let body = sandbox.run_main(program);
    tokio::pin!(body);
    loop {
        tokio::select! {
            result = &mut body => {
                result?;
                break;
            }
            Some(event) = events.recv() => timer_outcome(event)?,
        }
    }

    loop {
        while let Ok(event) = events.try_recv() {
            timer_outcome(event)?;
        }
        {
            let core = core.borrow();
            if !core.is_live(id) {
                return Err(ScriptError::Cancelled);
            }
            if core.current.as_ref().map_or(true, |s| s.timers.is_empty()) {
                return Ok(());
            }
        }
        tokio::select! {
            Some(event) = events.recv() => timer_outcome(event)?,
            changed = status.changed() => {
                if changed.is_err() {
                    return Err(ScriptError::Cancelled);
                }
            }
        }
    }
}

fn timer_outcome(event: TimerEvent) -> Result<(), ScriptError> {
    if let Err(err) = &event.outcome {
        debug!(timer = event.timer, error = %err, "timer callback failed");
    }
    event.outcome
}

fn finish(core: &Shared, id: SessionId, outcome: Result<(), ScriptError>) {
    let mut core = core.borrow_mut();
    let live = core.is_live(id);
    if let Some(session) = core.session_mut(id) {
        session.timers.cancel_all();
    }
    core.broker.release(id);

    if !live {
        debug!(session = %id, "superseded run wound down");
        core.publish();
        return;
    }

    match outcome {
        Ok(()) => {
            core.transcript.push(LineKind::Success, "Program completed successfully");
            core.set_state(id, SessionState::Completed);
            info!(session = %id, "run completed");
        }
        Err(ScriptError::Cancelled) => {
            core.set_state(id, SessionState::Halted);
            debug!(session = %id, "run cancelled");
        }
        Err(err) => {
            core.transcript.push(LineKind::Error, err.to_string());
            core.set_state(id, SessionState::Failed);
            warn!(session = %id, error = %err, "run failed");
        }
    }
}
