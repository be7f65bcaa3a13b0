//! The thread and runtime scripts are evaluated on.
//!
//! Evaluation recurses on the native stack once per script call and once per
//! level of syntax nesting. Both are bounded (`max_call_depth` and the
//! parser's nesting limit), and the engine thread is given a stack large
//! enough for those bounds, which the main thread's default is not.

use std::future::Future;
use std::io;
use std::panic;
use std::thread;

use tokio::runtime::{Builder, Runtime};
use tokio::task::LocalSet;

/// Stack reserved for the engine thread.
pub const ENGINE_STACK_SIZE: usize = 128 * 1024 * 1024;

pub fn engine_thread() -> thread::Builder {
    thread::Builder::new().name("promptrun-engine".to_string()).stack_size(ENGINE_STACK_SIZE)
}

/// Single-threaded runtime with timers; blocking work still goes to tokio's
/// blocking pool.
pub fn engine_runtime() -> io::Result<Runtime> {
    Builder::new_current_thread().enable_time().build()
}

/// Build a future on a fresh engine thread and drive it inside a `LocalSet`.
///
/// The controller is `!Send`, so `make` is where it gets created. A panic on
/// the engine thread is resumed on the caller's.
pub fn run_on_engine_thread<F, Fut>(make: F) -> io::Result<Fut::Output>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future,
    Fut::Output: Send + 'static,
{
    let handle = engine_thread().spawn(move || -> io::Result<Fut::Output> {
        let runtime = engine_runtime()?;
        Ok(LocalSet::new().block_on(&runtime, make()))
    })?;
    match handle.join() {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}
