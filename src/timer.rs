/// Quantum timer: arms a repeating virtual-interval alarm and dispatches its
/// signal into the scheduler on every tick.
///
/// The handler below runs with `PREEMPT_SIGNAL` already masked by the kernel
/// for its duration (signal handlers implicitly mask the signal that fired
/// them unless installed with `SA_NODEFER`), so it needs no additional guard
/// of its own before touching scheduler state. It does call into `log`'s
/// `trace`/`debug` macros on this path; that is not strictly async-signal-safe
/// in general (the global logger may allocate or lock), and a deployment
/// that needs hard async-signal-safety guarantees should configure a
/// lock-free, allocation-free `log` backend. Test and example configurations
/// in this crate use `env_logger`, which does not make that guarantee and is
/// fine for development and test use only.
use crate::scheduler;
use std::mem;

/// The preemption signal. `SIGVTALRM` fires only while the process is
/// actually executing user-mode CPU time, which is what "quantum" means
/// here — wall-clock time spent blocked in the kernel (e.g. on I/O) does not
/// count against a thread's slice.
pub const PREEMPT_SIGNAL: libc::c_int = libc::SIGVTALRM;

/// Install the handler and arm the repeating virtual timer at `quantum_usecs`.
///
/// # Safety
/// Must be called at most once, before any other thread-library entry point,
/// and never from inside a signal handler.
pub unsafe fn install(quantum_usecs: u64) -> Result<(), &'static str> {
    let mut action: libc::sigaction = mem::zeroed();
    action.sa_sigaction = handle_tick as usize;
    action.sa_flags = 0;
    libc::sigemptyset(&mut action.sa_mask);

    if libc::sigaction(PREEMPT_SIGNAL, &action, std::ptr::null_mut()) != 0 {
        return Err("sigaction installation failed");
    }

    let interval = libc::timeval {
        tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
        tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
    };
    let timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };
    if libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) != 0 {
        return Err("setitimer arming failed");
    }

    Ok(())
}

extern "C" fn handle_tick(_signum: libc::c_int) {
    scheduler::on_timer_tick();
}
