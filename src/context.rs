/// Low-level context switch: save/restore SP, PC, and signal mask; trampoline
/// onto a fresh stack.
///
/// This is the only architecture-specific code in the crate. It does not use
/// libc's `sigsetjmp`/`siglongjmp` — `jmp_buf`'s layout is glibc-version
/// sensitive and, on some platforms, pointer-mangled (`fs:0x30` xor + rotate
/// on x86-64 glibc). Instead we save exactly the System V callee-saved
/// register set plus the stack pointer in a struct we own, and let the
/// processor's own `call`/`ret` convention carry the resume address on the
/// stack rather than in a separate field — there is no dedicated link
/// register on x86-64 the way there is on, say, RISC-V.
use crate::timer::PREEMPT_SIGNAL;
use std::mem;

/// Register state saved by [`switch`]. `rsp` alone is sufficient to resume:
/// the six callee-saved GPRs live just above it on the owning stack, and the
/// resume address lives just above those, exactly as a normal `call` would
/// have left them.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Regs {
    rsp: u64,
}

/// Saved CPU context: register state plus the signal mask in effect at the
/// moment of suspension. The mask must include the preemption signal as
/// masked, so that a resumed thread keeps preemption masked until the
/// caller that invoked the scheduler explicitly unmasks it.
pub struct Context {
    regs: Regs,
    mask: libc::sigset_t,
}

impl Context {
    pub fn new() -> Self {
        let mut mask: libc::sigset_t = unsafe { mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut mask);
        }
        Context {
            regs: Regs::default(),
            mask,
        }
    }

    /// Lay out a synthetic initial frame at the top of `stack_top` so that
    /// switching into this context for the first time starts execution at
    /// `trampoline` with an ABI-aligned stack.
    ///
    /// # Safety
    /// `stack_top` must be the (16-byte aligned) top address of a private
    /// stack of at least 64 live bytes, not currently in use.
    pub unsafe fn init_entry(&mut self, stack_top: usize, trampoline: extern "C" fn() -> !) {
        debug_assert_eq!(stack_top % 16, 0);

        // Six zeroed callee-saved GPRs (r15, r14, r13, r12, rbp, rbx, in pop
        // order) followed by the trampoline address where a plain `ret`
        // would land, shifted down by 8 so the landing RSP is 8 (mod 16) —
        // the SysV convention for a function's first instruction.
        let base = stack_top - 8;
        let ret_addr = (base - 8) as *mut u64;
        let rbx = (base - 16) as *mut u64;
        let rbp = (base - 24) as *mut u64;
        let r12 = (base - 32) as *mut u64;
        let r13 = (base - 40) as *mut u64;
        let r14 = (base - 48) as *mut u64;
        let r15 = (base - 56) as *mut u64;

        ret_addr.write(trampoline as usize as u64);
        rbx.write(0);
        rbp.write(0);
        r12.write(0);
        r13.write(0);
        r14.write(0);
        r15.write(0);

        self.regs.rsp = (base - 56) as u64;

        let mut mask: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut mask);
        self.mask = mask;
    }
}

/// Save the outgoing context's registers and signal mask into `old`, release
/// the critical-section guard, and transfer control to `new`. Returns (to
/// its *original* caller, not necessarily this one) the next time something
/// switches back into `old`.
///
/// The guard is deliberately released *before* `new` starts running: a
/// freshly trampolined thread, or one resuming mid-critical-section, should
/// run preemptible like any other thread, not inherit the caller's mask
/// forever. When `old` is itself resumed later, it lands back here and
/// re-masks the signal, because it is, by construction, only ever resumed
/// from inside the guard it suspended under; that mask is released again
/// once the critical section it is inside of unwinds normally.
///
/// # Safety
/// Both pointers must reference live, distinct [`Context`]s; `new` must have
/// been produced by [`Context::init_entry`] or by a previous [`switch`] that
/// saved a thread suspended inside the critical-section guard.
pub unsafe fn switch(old: *mut Context, new: *const Context) {
    let mut current: libc::sigset_t = mem::zeroed();
    libc::sigprocmask(libc::SIG_BLOCK, std::ptr::null(), &mut current);
    (*old).mask = current;

    let mut released = current;
    libc::sigdelset(&mut released, PREEMPT_SIGNAL);
    libc::sigprocmask(libc::SIG_SETMASK, &released, std::ptr::null_mut());

    switch_regs(&mut (*old).regs, &(*new).regs);

    // Reached only once something switches back into `old`: re-establish the
    // mask captured at the moment this thread suspended.
    let mask = (*old).mask;
    libc::sigprocmask(libc::SIG_SETMASK, &mask, std::ptr::null_mut());
}

// Written as a raw `global_asm!` routine, the same way the reference kernel
// hand-writes its interrupt entry trampoline: no Rust-generated prologue or
// epilogue to fight with (in particular, no risk of the compiler assuming
// `rbp`/`rbx`/`r12`-`r15` survive the call when this routine deliberately
// overwrites them with the incoming thread's values).
#[cfg(target_arch = "x86_64")]
core::arch::global_asm!(
    ".global uthreads_switch_regs",
    "uthreads_switch_regs:",
    "push rbx",
    "push rbp",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, [rsi]",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbp",
    "pop rbx",
    "ret",
);

#[cfg(target_arch = "x86_64")]
extern "C" {
    fn uthreads_switch_regs(old: *mut Regs, new: *const Regs);
}

#[cfg(target_arch = "x86_64")]
unsafe fn switch_regs(old: *mut Regs, new: *const Regs) {
    uthreads_switch_regs(old, new);
}

#[cfg(not(target_arch = "x86_64"))]
compile_error!("uthreads' context switch is implemented for x86_64 only");
