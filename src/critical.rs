/// Critical-section discipline built on signal masking rather than a lock.
///
/// There is exactly one OS thread, so a spinlock held across delivery of the
/// preemption signal would deadlock the process against itself: the signal
/// handler can never run on a different core to make progress. Masking the
/// signal for the duration of a critical section is the only correct way to
/// keep the scheduler's own state consistent against the timer handler.
use crate::timer::PREEMPT_SIGNAL;
use std::mem;

/// Run `f` with the preemption signal blocked, restoring the prior mask
/// (blocked or not) on return — including on unwind, though this crate
/// builds with `panic = "abort"` so that path is unreachable in practice.
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let prev = block_preempt_signal();
    let result = f();
    restore_signal_mask(prev);
    result
}

/// Block the preemption signal and return the previously active mask.
pub fn block_preempt_signal() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, PREEMPT_SIGNAL);

        let mut prev: libc::sigset_t = mem::zeroed();
        let rc = libc::sigprocmask(libc::SIG_BLOCK, &set, &mut prev);
        if rc != 0 {
            crate::error::fatal_system_error("sigprocmask(SIG_BLOCK) failed");
        }
        prev
    }
}

/// Restore a previously captured signal mask verbatim.
pub fn restore_signal_mask(mask: libc::sigset_t) {
    unsafe {
        let rc = libc::sigprocmask(libc::SIG_SETMASK, &mask, std::ptr::null_mut());
        if rc != 0 {
            crate::error::fatal_system_error("sigprocmask(SIG_SETMASK) failed");
        }
    }
}
