/// The scheduler, the TCB table's owner, and the public API's implementation.
///
/// All shared state lives behind one `static mut Option<Runtime>`, following
/// the single-OS-thread, signal-masked-guard model in the crate's design: a
/// `Mutex` would be both unnecessary (nothing else can run concurrently) and
/// unsound (a signal handler blocking on a lock held by the code it
/// interrupted deadlocks immediately). The table itself is a single `Box`
/// allocated once, at `init`, and never resized or reallocated afterward —
/// the slots it holds are the only storage a thread ever occupies.
use crate::context::{self, Context};
use crate::critical::critical_section;
use crate::error::{Result, UthreadError};
use crate::tcb::{Entry, Tcb, ThreadState, Tid, MAX_THREADS};
use crate::timer;
use std::sync::atomic::{AtomicBool, Ordering};

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static mut RUNTIME: Option<Runtime> = None;

struct Runtime {
    tcbs: Box<[Tcb; MAX_THREADS]>,
    current_tid: Tid,
    total_quantums: u64,
}

impl Runtime {
    fn pick_next(&self) -> Option<Tid> {
        for offset in 1..MAX_THREADS {
            let candidate = (self.current_tid + offset) % MAX_THREADS;
            if self.tcbs[candidate].state == ThreadState::Ready {
                return Some(candidate);
            }
        }
        None
    }

    /// Hand the CPU to the next `READY` thread, or restore the caller's own
    /// thread to `RUNNING` in place if nothing else is runnable. The
    /// caller's outgoing state must already be set (`Ready`/`Blocked`) before
    /// calling this.
    fn schedule(&mut self) {
        let outgoing = self.current_tid;
        match self.pick_next() {
            Some(next) => {
                self.tcbs[next].state = ThreadState::Running;
                self.current_tid = next;
                log::trace!("schedule: {outgoing} -> {next}");
                let old_ctx: *mut Context = &mut self.tcbs[outgoing].context;
                let new_ctx: *const Context = &self.tcbs[next].context;
                unsafe {
                    context::switch(old_ctx, new_ctx);
                }
            }
            None => {
                if self.tcbs[outgoing].state == ThreadState::Ready {
                    self.tcbs[outgoing].state = ThreadState::Running;
                    log::trace!("schedule: {outgoing} stays current, nothing else runnable");
                } else {
                    crate::error::fatal_system_error(
                        "scheduler deadlock: no runnable thread remains",
                    );
                }
            }
        }
    }

    fn wake_expired_sleepers(&mut self) {
        for tcb in self.tcbs.iter_mut() {
            if tcb.state == ThreadState::Blocked && tcb.wake_at != 0 && tcb.wake_at <= self.total_quantums {
                tcb.wake_at = 0;
                tcb.state = ThreadState::Ready;
                log::trace!("wake: {} eligible at quantum {}", tcb.tid, self.total_quantums);
            }
        }
    }
}

fn runtime() -> Result<&'static Runtime> {
    unsafe { RUNTIME.as_ref().ok_or(UthreadError::NotInitialized) }
}

fn runtime_mut() -> Result<&'static mut Runtime> {
    unsafe { RUNTIME.as_mut().ok_or(UthreadError::NotInitialized) }
}

fn check_tid(rt: &Runtime, tid: Tid) -> Result<()> {
    if tid >= MAX_THREADS || rt.tcbs[tid].state == ThreadState::Unused {
        Err(UthreadError::UnknownThread(tid))
    } else {
        Ok(())
    }
}

pub fn init(quantum_usecs: u64) -> Result<()> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        log::warn!("init: already initialized");
        return Err(UthreadError::AlreadyInitialized);
    }
    if quantum_usecs == 0 {
        INITIALIZED.store(false, Ordering::SeqCst);
        log::warn!("init: quantum_usecs must be greater than zero");
        return Err(UthreadError::InvalidQuantum);
    }

    let mut tcbs = Box::new(std::array::from_fn(Tcb::new));
    tcbs[0].state = ThreadState::Running;
    tcbs[0].quantums_run = 1;

    unsafe {
        RUNTIME = Some(Runtime {
            tcbs,
            current_tid: 0,
            total_quantums: 1,
        });

        if let Err(msg) = timer::install(quantum_usecs) {
            crate::error::fatal_system_error(msg);
        }
    }

    log::info!("init: quantum_usecs={quantum_usecs}");
    Ok(())
}

pub fn spawn(entry: Entry) -> Result<Tid> {
    critical_section(|| {
        let rt = runtime_mut()?;
        let tid = (1..MAX_THREADS)
            .find(|&i| rt.tcbs[i].state == ThreadState::Unused)
            .ok_or(UthreadError::NoFreeSlots)?;

        let stack_top = rt.tcbs[tid].stack.top();
        rt.tcbs[tid].state = ThreadState::Ready;
        rt.tcbs[tid].entry = Some(entry);
        unsafe {
            rt.tcbs[tid].context.init_entry(stack_top, trampoline);
        }

        log::debug!("spawn: tid={tid}");
        Ok(tid)
    })
}

/// If `tid == current_tid`, this never returns to its caller: the scheduler
/// switches away inside the critical section before the call unwinds.
pub fn terminate(tid: Tid) -> Result<()> {
    if tid == 0 {
        critical_section(|| {
            let rt = runtime_mut()?;
            for tcb in rt.tcbs.iter_mut() {
                tcb.reset();
            }
            log::info!("terminate(0): exiting process");
            Ok::<(), UthreadError>(())
        })?;
        std::process::exit(1);
    }

    critical_section(|| {
        let rt = runtime_mut()?;
        if check_tid(rt, tid).is_err() {
            log::warn!("terminate: unknown tid {tid}");
            return Err(UthreadError::UnknownThread(tid));
        }

        let is_current = tid == rt.current_tid;
        rt.tcbs[tid].reset();
        log::debug!("terminate: tid={tid}");

        if is_current {
            rt.schedule();
            unreachable!("terminate: scheduler switched away from terminated thread");
        }
        Ok(())
    })
}

pub fn block(tid: Tid) -> Result<()> {
    if tid == 0 {
        log::warn!("block: cannot block the main thread");
        return Err(UthreadError::MainThreadRestricted("block"));
    }

    critical_section(|| {
        let rt = runtime_mut()?;
        if check_tid(rt, tid).is_err() {
            log::warn!("block: unknown tid {tid}");
            return Err(UthreadError::UnknownThread(tid));
        }

        match rt.tcbs[tid].state {
            ThreadState::Running | ThreadState::Ready => {
                rt.tcbs[tid].state = ThreadState::Blocked;
                rt.tcbs[tid].wake_at = 0;
                log::debug!("block: tid={tid}");
                if tid == rt.current_tid {
                    rt.schedule();
                }
            }
            ThreadState::Blocked => {
                log::debug!("block: tid={tid} already blocked, no-op");
            }
            ThreadState::Unused | ThreadState::Terminated => unreachable!(),
        }
        Ok(())
    })
}

pub fn resume(tid: Tid) -> Result<()> {
    critical_section(|| {
        let rt = runtime_mut()?;
        if check_tid(rt, tid).is_err() {
            log::warn!("resume: unknown tid {tid}");
            return Err(UthreadError::UnknownThread(tid));
        }

        if rt.tcbs[tid].state == ThreadState::Blocked {
            rt.tcbs[tid].state = ThreadState::Ready;
            rt.tcbs[tid].wake_at = 0;
            log::debug!("resume: tid={tid}");
        } else {
            log::debug!("resume: tid={tid} already runnable, no-op");
        }
        Ok(())
    })
}

pub fn sleep(quantums: u64) -> Result<()> {
    critical_section(|| {
        let rt = runtime_mut()?;
        if rt.current_tid == 0 {
            log::warn!("sleep: main thread cannot sleep");
            return Err(UthreadError::MainThreadRestricted("sleep"));
        }

        let tid = rt.current_tid;
        rt.tcbs[tid].wake_at = rt.total_quantums + quantums;
        rt.tcbs[tid].state = ThreadState::Blocked;
        log::debug!("sleep: tid={tid} for {quantums} quantum(s)");
        rt.schedule();
        Ok(())
    })
}

pub fn get_tid() -> Tid {
    critical_section(|| runtime().map(|rt| rt.current_tid).unwrap_or(0))
}

pub fn get_total_quantums() -> u64 {
    critical_section(|| runtime().map(|rt| rt.total_quantums).unwrap_or(0))
}

pub fn get_quantums(tid: Tid) -> Result<u64> {
    critical_section(|| {
        let rt = runtime()?;
        if check_tid(rt, tid).is_err() {
            log::warn!("get_quantums: unknown tid {tid}");
            return Err(UthreadError::UnknownThread(tid));
        }
        let mut count = rt.tcbs[tid].quantums_run;
        if tid == rt.current_tid {
            count += 1;
        }
        Ok(count)
    })
}

/// Invoked from the `SIGVTALRM` handler. The kernel has already masked the
/// preemption signal for the handler's duration; no additional guard needed.
pub fn on_timer_tick() {
    let rt = match unsafe { RUNTIME.as_mut() } {
        Some(rt) => rt,
        None => return,
    };

    rt.total_quantums += 1;
    rt.tcbs[rt.current_tid].quantums_run += 1;
    log::trace!("tick: total_quantums={}", rt.total_quantums);
    rt.wake_expired_sleepers();

    if rt.tcbs[rt.current_tid].state == ThreadState::Running {
        rt.tcbs[rt.current_tid].state = ThreadState::Ready;
    }
    rt.schedule();
}

/// Runs on a freshly spawned thread's own stack. Reads the entry closure the
/// spawning call published (no synchronization needed: the closure was
/// written before this slot was made schedulable) and self-terminates when
/// it returns.
extern "C" fn trampoline() -> ! {
    let (tid, entry) = unsafe {
        let rt = RUNTIME
            .as_mut()
            .expect("trampoline: runtime not initialized");
        let tid = rt.current_tid;
        let entry = rt.tcbs[tid]
            .entry
            .take()
            .expect("trampoline: entry missing for running thread");
        (tid, entry)
    };

    entry();

    match terminate(tid) {
        Ok(()) => unreachable!("terminate(self) must not return"),
        Err(e) => crate::error::fatal_system_error(&format!(
            "trampoline: terminate({tid}) failed unexpectedly: {e}"
        )),
    }
}
