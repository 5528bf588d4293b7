/// Logical-error surface for the public API, plus the fatal host-error path.
///
/// Every fallible entry point in [`crate`] returns [`Result<T>`]; library
/// state is left unchanged whenever an `Err` is produced. Host-level
/// failures (signal/timer syscalls expected never to fail) are not part of
/// this enum — control never returns to a caller that could observe one,
/// so they are reported and the process exits instead (see
/// [`fatal_system_error`]).
use crate::tcb::Tid;

/// Result alias used throughout the public API.
pub type Result<T> = core::result::Result<T, UthreadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UthreadError {
    #[error("library already initialized")]
    AlreadyInitialized,

    #[error("library not yet initialized")]
    NotInitialized,

    #[error("quantum length must be greater than zero")]
    InvalidQuantum,

    #[error("no free thread slots (MAX_THREADS reached)")]
    NoFreeSlots,

    #[error("thread {0} does not exist")]
    UnknownThread(Tid),

    #[error("cannot {0} the main thread")]
    MainThreadRestricted(&'static str),
}

/// Report an unrecoverable host-level failure and terminate the process.
///
/// Used for syscalls this crate treats as infallible in practice
/// (`sigaction`, `setitimer`, `sigprocmask`): if the host refuses them there
/// is no state to roll back to and no sane value to return, so the process
/// exits with the diagnostic on stderr, matching the host-error contract.
pub fn fatal_system_error(msg: &str) -> ! {
    eprintln!("system error: {msg}");
    std::process::exit(1);
}
