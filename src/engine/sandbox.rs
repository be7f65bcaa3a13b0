//! The restricted global scope a run evaluates against.
//!
//! Everything the script can reach is built here for one session and bound
//! to that session's id through a [`SessionContext`]. Nothing process-wide
//! is touched, so a superseded run's natives turn into no-ops the moment
//! the controller moves on.
//!
//! The main body and the timer callbacks take turns: each holds the
//! session's single run permit while it evaluates and gives it up only
//! while a `prompt` waits for the user. A cooperative yield inside a busy
//! loop therefore never lets a timer callback run in the middle of it.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::FutureExt;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::broker::{Acquire, InputReply};
use super::controller::Shared;
use super::error::ScriptError;
use super::session::{SessionId, SessionState};
use super::transcript::LineKind;
use crate::script::ast::Program;
use crate::script::{builtins, Env, Interpreter, NativeFunction, Unwind, Value};

/// Reported to the driver every time a timer callback has run.
#[derive(Debug)]
pub(crate) struct TimerEvent {
    pub timer: u32,
    pub outcome: Result<(), ScriptError>,
}

/// Handle the sandbox natives share.
pub(crate) struct SessionContext {
    core: Shared,
    id: SessionId,
    events: mpsc::UnboundedSender<TimerEvent>,
    next_timer: Cell<u32>,
    /// Timers whose callback is on the stack right now.
    firing: RefCell<HashSet<u32>>,
    run_permit: Arc<Semaphore>,
    /// The permit and the turn holding it.
    held: RefCell<Option<(u64, OwnedSemaphorePermit)>>,
    next_turn: Cell<u64>,
}

/// Releases the run permit when the turn that took it ends.
struct Turn<'a> {
    ctx: &'a SessionContext,
    owner: u64,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut held = self.ctx.held.borrow_mut();
        if held.as_ref().is_some_and(|(owner, _)| *owner == self.owner) {
            held.take();
        }
    }
}

pub(crate) struct Sandbox {
    globals: Rc<Env>,
    scope: Rc<Env>,
    interp: Interpreter,
    ctx: Rc<SessionContext>,
}

impl Sandbox {
    pub(crate) fn new(core: Shared, id: SessionId, events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        let options = core.borrow().config.interpreter;
        let live = {
            let core = core.clone();
            move || core.borrow().is_live(id)
        };
        let interp = Interpreter::new(options, live);

        let ctx = Rc::new(SessionContext {
            core,
            id,
            events,
            next_timer: Cell::new(1),
            firing: RefCell::default(),
            run_permit: Arc::new(Semaphore::new(1)),
            held: RefCell::default(),
            next_turn: Cell::new(0),
        });
        let globals = Env::root();
        builtins::install(&globals);
        globals.declare("console", console(&ctx), false);
        globals.declare("prompt", prompt(&ctx), false);
        globals.declare("setTimeout", set_timer(&ctx, "setTimeout", false), false);
        globals.declare("setInterval", set_timer(&ctx, "setInterval", true), false);
        globals.declare("clearTimeout", clear_timer(&ctx, "clearTimeout"), false);
        globals.declare("clearInterval", clear_timer(&ctx, "clearInterval"), false);

        let scope = Env::child(&globals);
        Self { globals, scope, interp, ctx }
    }

    pub(crate) async fn run_main(&self, program: &Program) -> Result<(), ScriptError> {
        let _turn = self.ctx.take_turn().await.map_err(Unwind::into_error)?;
        self.interp.run(program, &self.scope).await.map_err(Unwind::into_error)
    }

    /// Drop the run's bindings so closures stored in them can be freed.
    pub(crate) fn teardown(&self) {
        trace!(steps = self.interp.steps(), "sandbox teardown");
        self.scope.clear();
        self.globals.clear();
    }
}

/// `console.log(a, b)` renders as `a b`.
fn format_args(args: &[Value]) -> String {
    args.iter().map(Value::to_console).collect::<Vec<_>>().join(" ")
}

fn console(ctx: &Rc<SessionContext>) -> Value {
    let method = |name: &'static str, kind: LineKind| {
        let ctx = ctx.clone();
        let function = NativeFunction::sync(name, move |args| {
            ctx.core.borrow_mut().emit(ctx.id, kind, format_args(args));
            Ok(Value::Undefined)
        });
        (name, function)
    };
    Value::frozen_object(vec![
        method("log", LineKind::ProgramOutput),
        method("info", LineKind::ProgramOutput),
        method("warn", LineKind::ProgramOutput),
        method("error", LineKind::Error),
        method("debug", LineKind::Debug),
    ])
}

fn prompt(ctx: &Rc<SessionContext>) -> Value {
    let ctx = ctx.clone();
    NativeFunction::value("prompt", move |call| {
        let ctx = ctx.clone();
        async move {
            if !call.awaited {
                return Err(Unwind::Abort(ScriptError::InputNotAwaited));
            }
            let message = match call.arg(0) {
                Value::Undefined => String::new(),
                other => other.to_display(),
            };
            ctx.ask(message).await
        }
        .boxed_local()
    })
}

impl SessionContext {
    fn cancelled() -> Unwind {
        Unwind::Abort(ScriptError::Cancelled)
    }

    fn busy() -> Unwind {
        Unwind::error("Error", "prompt() called while another prompt is waiting for input")
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, Unwind> {
        self.run_permit.clone().acquire_owned().await.map_err(|_| Self::cancelled())
    }

    /// Wait until nothing else in this session is evaluating.
    async fn take_turn(&self) -> Result<Turn<'_>, Unwind> {
        let permit = self.acquire().await?;
        let owner = self.next_turn.get();
        self.next_turn.set(owner + 1);
        *self.held.borrow_mut() = Some((owner, permit));
        Ok(Turn { ctx: self, owner })
    }

    async fn ask(&self, message: String) -> Result<Value, Unwind> {
        let wait = {
            let mut core = self.core.borrow_mut();
            if !core.is_live(self.id) {
                return Err(Self::cancelled());
            }
            if core.broker.is_waiting() {
                return Err(Self::busy());
            }
            core.transcript.push(LineKind::System, message.clone());
            match core.broker.request(self.id, message) {
                Some(Acquire::Ready(value)) => {
                    core.transcript.push(LineKind::EchoInput, value.clone());
                    return Ok(Value::from(value));
                }
                Some(Acquire::Wait(wait)) => {
                    core.set_state(self.id, SessionState::AwaitingInput);
                    debug!(session = %self.id, "awaiting input");
                    wait
                }
                None => return Err(Self::busy()),
            }
        };

        // Let timer callbacks run while the user is typing.
        let owner = self.held.borrow_mut().take().map(|(owner, _)| owner);
        let value = match wait.await {
            Ok(InputReply::Value(value)) => value,
            Ok(InputReply::Cancelled) | Err(_) => return Err(Self::cancelled()),
        };
        if let Some(owner) = owner {
            let permit = self.acquire().await?;
            *self.held.borrow_mut() = Some((owner, permit));
        }
        Ok(Value::from(value))
    }

    fn timer_active(&self, timer: u32) -> bool {
        let core = self.core.borrow();
        core.is_live(self.id) && core.current.as_ref().is_some_and(|s| s.timers.contains(timer))
    }

    fn forget_timer(&self, timer: u32) {
        if let Some(session) = self.core.borrow_mut().session_mut(self.id) {
            session.timers.forget(timer);
        }
    }

    fn schedule(self: &Rc<Self>, name: &str, args: &[Value], interp: Interpreter, repeat: bool) -> Result<Value, Unwind> {
        let callback = args.first().cloned().unwrap_or_default();
        if !callback.is_callable() {
            return Err(Unwind::type_error(format!("{name}: the callback argument must be a function")));
        }
        let requested = args.get(1).map(Value::to_number).unwrap_or(0.0);
        let millis = if requested.is_nan() || requested < 0.0 { 0.0 } else { requested.trunc() };

        let ceiling = self.core.borrow().config.timer_ceiling;
        if millis > ceiling.as_millis() as f64 {
            return Err(Unwind::range_error(format!(
                "{name} delay of {} ms exceeds the {} ms limit",
                crate::script::value::format_number(millis),
                ceiling.as_millis()
            )));
        }
        if !self.core.borrow().is_live(self.id) {
            return Err(Self::cancelled());
        }

        let timer = self.next_timer.get();
        self.next_timer.set(timer + 1);
        let delay = Duration::from_millis(millis as u64);
        let extra = args.get(2..).map(<[Value]>::to_vec).unwrap_or_default();
        let ctx = self.clone();
        let task = tokio::task::spawn_local(async move {
            ctx.run_timer(timer, interp, callback, extra, delay, repeat).await;
        });

        if let Some(session) = self.core.borrow_mut().session_mut(self.id) {
            session.timers.insert(timer, task.abort_handle());
        }
        trace!(session = %self.id, timer, delay_ms = millis, repeat, "timer scheduled");
        Ok(Value::Number(f64::from(timer)))
    }

    async fn run_timer(&self, timer: u32, interp: Interpreter, callback: Value, args: Vec<Value>, delay: Duration, repeat: bool) {
        if repeat {
            let period = delay.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            // Ticks missed while waiting for the run permit are not replayed.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !self.fire(timer, &interp, &callback, &args, false).await {
                    break;
                }
            }
        } else {
            tokio::time::sleep(delay).await;
            self.fire(timer, &interp, &callback, &args, true).await;
        }
    }

    /// Run one callback. Returns whether an interval should keep going.
    async fn fire(&self, timer: u32, interp: &Interpreter, callback: &Value, args: &[Value], last: bool) -> bool {
        let Ok(_turn) = self.take_turn().await else {
            return false;
        };
        if !self.timer_active(timer) {
            return false;
        }
        self.firing.borrow_mut().insert(timer);
        let outcome = interp
            .call_value(callback, args.to_vec())
            .await
            .map(|_| ())
            .map_err(Unwind::into_error);
        self.firing.borrow_mut().remove(&timer);
        let failed = outcome.is_err();
        if last || failed {
            self.forget_timer(timer);
        }
        // The driver is gone once the run has ended.
        let _ = self.events.send(TimerEvent { timer, outcome });
        !failed
    }
}

fn set_timer(ctx: &Rc<SessionContext>, name: &'static str, repeat: bool) -> Value {
    let ctx = ctx.clone();
    NativeFunction::value(name, move |call| {
        let result = ctx.schedule(name, &call.args, call.interp.clone(), repeat);
        future::ready(result).boxed_local()
    })
}

fn clear_timer(ctx: &Rc<SessionContext>, name: &'static str) -> Value {
    let ctx = ctx.clone();
    NativeFunction::sync(name, move |args| {
        let id = args.first().map(Value::to_number).unwrap_or(f64::NAN);
        if !id.is_finite() || id < 1.0 {
            return Ok(Value::Undefined);
        }
        let timer = id as u32;
        let cleared = match ctx.core.borrow_mut().session_mut(ctx.id) {
            // A callback clearing its own timer finishes running; the task stops at its next check.
            Some(session) if ctx.firing.borrow().contains(&timer) => session.timers.forget(timer),
            Some(session) => session.timers.cancel(timer),
            None => false,
        };
        if cleared {
            // Wake the driver so it notices when the last timer is gone.
            let _ = ctx.events.send(TimerEvent { timer, outcome: Ok(()) });
        }
        Ok(Value::Undefined)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_arguments_are_space_separated() {
        let args = [Value::str("total:"), Value::Number(3.0), Value::Null, Value::array(vec![Value::Number(1.0)])];
        assert_eq!(format_args(&args), "total: 3 null [1]");
    }
}
