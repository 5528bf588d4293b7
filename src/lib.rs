//! A user-level preemptive thread library that multiplexes a fixed pool of
//! cooperatively- and preemptively-scheduled execution contexts onto a
//! single OS thread.
//!
//! Each user thread gets its own private stack and is preempted in
//! round-robin order on a fixed virtual-time quantum, driven by
//! `SIGVTALRM`/`ITIMER_VIRTUAL`. There is no multi-core parallelism: exactly
//! one user thread executes at any instant, and the library relies on that
//! fact (rather than a lock) to keep its own bookkeeping consistent across
//! asynchronous preemption.
//!
//! ```no_run
//! uthreads::init(100_000).unwrap();
//! let tid = uthreads::spawn(|| {
//!     println!("hello from tid {}", uthreads::get_tid());
//! }).unwrap();
//! while uthreads::get_quantums(tid).is_ok() {
//!     uthreads::get_total_quantums();
//! }
//! ```

mod context;
mod critical;
mod error;
mod scheduler;
mod tcb;
mod timer;

pub use error::{Result, UthreadError};
pub use tcb::{Tid, MAX_THREADS};

/// Initialize the library with a quantum length in microseconds. Must be
/// called at most once per process, before any other entry point.
pub fn init(quantum_usecs: u64) -> Result<()> {
    scheduler::init(quantum_usecs)
}

/// Spawn a new thread running `entry` on its own private stack. Returns the
/// numerically smallest free thread id.
pub fn spawn<F>(entry: F) -> Result<Tid>
where
    F: FnOnce() + Send + 'static,
{
    scheduler::spawn(Box::new(entry))
}

/// Terminate thread `tid`. Terminating `tid = 0` (the main thread) tears
/// down every slot and exits the process with status `1`. Terminating the
/// calling thread never returns to its caller.
pub fn terminate(tid: Tid) -> Result<()> {
    scheduler::terminate(tid)
}

/// Block a non-main thread. Blocking the calling thread yields the CPU
/// immediately.
pub fn block(tid: Tid) -> Result<()> {
    scheduler::block(tid)
}

/// Move a blocked thread back to `READY`. A no-op on a thread that is
/// already running or ready.
pub fn resume(tid: Tid) -> Result<()> {
    scheduler::resume(tid)
}

/// Block the calling thread for at least `quantums` full quanta. Fails when
/// called from the main thread.
pub fn sleep(quantums: u64) -> Result<()> {
    scheduler::sleep(quantums)
}

/// The currently running thread's id.
pub fn get_tid() -> Tid {
    scheduler::get_tid()
}

/// Total quanta elapsed since `init`.
pub fn get_total_quantums() -> u64 {
    scheduler::get_total_quantums()
}

/// Quanta thread `tid` has been scheduled for, including the in-flight
/// quantum if `tid` is currently running.
pub fn get_quantums(tid: Tid) -> Result<u64> {
    scheduler::get_quantums(tid)
}
