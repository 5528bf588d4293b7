//! Shared in-process runtime tests.
//!
//! These all exercise the one process-global scheduler, so they run against
//! a single shared `init()` call guarded by `Once`, and MUST be run with
//! `cargo test --test runtime -- --test-threads=1`: the library has no
//! notion of more than one OS thread, and parallel `#[test]` functions would
//! otherwise race on the same timer and TCB table.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();

fn ensure_runtime() {
    INIT.call_once(|| {
        uthreads::init(50_000).expect("init should succeed exactly once");
    });
}

/// S1 — single spawn, main busy-waits for it to complete.
#[test]
fn spawn_runs_and_slot_is_freed_on_return() {
    ensure_runtime();

    static RAN: AtomicU64 = AtomicU64::new(0);
    let tid = uthreads::spawn(|| {
        RAN.store(1, Ordering::SeqCst);
    })
    .expect("spawn should succeed");

    while uthreads::get_quantums(tid).is_ok() {
        uthreads::get_total_quantums();
    }

    assert_eq!(RAN.load(Ordering::SeqCst), 1);
    assert!(uthreads::get_quantums(tid).is_err());
}

/// S3 — a thread sleeping for `n` quanta does not become runnable before
/// `total_quantums` has advanced by at least `n`.
#[test]
fn sleep_delays_at_least_n_quanta() {
    ensure_runtime();

    static WOKE_AFTER: AtomicU64 = AtomicU64::new(0);
    static DONE: AtomicU64 = AtomicU64::new(0);

    let before = uthreads::get_total_quantums();
    let tid = uthreads::spawn(move || {
        uthreads::sleep(3).expect("sleep should succeed on a non-main thread");
        WOKE_AFTER.store(uthreads::get_total_quantums(), Ordering::SeqCst);
        DONE.store(1, Ordering::SeqCst);
    })
    .expect("spawn should succeed");

    while DONE.load(Ordering::SeqCst) == 0 {
        uthreads::get_total_quantums();
    }

    assert!(WOKE_AFTER.load(Ordering::SeqCst) >= before + 3);
    assert!(uthreads::get_quantums(tid).is_err());
}

/// S4 — blocking a thread halts its quantum count; resuming it lets it grow
/// again.
#[test]
fn block_then_resume() {
    ensure_runtime();

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let tid = uthreads::spawn(|| loop {
        COUNTER.fetch_add(1, Ordering::SeqCst);
    })
    .expect("spawn should succeed");

    // Let it accumulate a few quanta before blocking it.
    while uthreads::get_quantums(tid).unwrap_or(0) < 2 {
        uthreads::get_total_quantums();
    }

    uthreads::block(tid).expect("block should succeed on a spawned thread");
    let frozen = uthreads::get_quantums(tid).expect("tid should still be live");

    let target = uthreads::get_total_quantums() + 3;
    while uthreads::get_total_quantums() < target {}
    assert_eq!(uthreads::get_quantums(tid).expect("still live"), frozen);

    uthreads::resume(tid).expect("resume should succeed");
    let resumed_target = frozen + 2;
    while uthreads::get_quantums(tid).unwrap_or(0) < resumed_target {
        uthreads::get_total_quantums();
    }

    uthreads::terminate(tid).expect("terminate from main should succeed");
    assert!(uthreads::get_quantums(tid).is_err());
}

/// Main-thread restrictions: main cannot sleep and cannot be blocked.
#[test]
fn main_thread_restrictions() {
    ensure_runtime();

    assert!(matches!(
        uthreads::sleep(1),
        Err(uthreads::UthreadError::MainThreadRestricted(_))
    ));
    assert!(matches!(
        uthreads::block(0),
        Err(uthreads::UthreadError::MainThreadRestricted(_))
    ));
}

/// Operating on an id that was never spawned (and is not 0) is always an error.
#[test]
fn unknown_thread_is_an_error() {
    ensure_runtime();

    let bogus = uthreads::MAX_THREADS - 1;
    assert!(matches!(
        uthreads::get_quantums(bogus),
        Err(uthreads::UthreadError::UnknownThread(_))
    ));
    assert!(matches!(
        uthreads::resume(bogus),
        Err(uthreads::UthreadError::UnknownThread(_))
    ));
}

/// S6 — exhausting every non-main slot leaves the table untouched on the
/// failing call.
#[test]
fn slot_exhaustion_leaves_state_unchanged() {
    ensure_runtime();

    let mut spawned = Vec::new();
    loop {
        match uthreads::spawn(|| loop {
            std::hint::spin_loop();
        }) {
            Ok(tid) => spawned.push(tid),
            Err(uthreads::UthreadError::NoFreeSlots) => break,
            Err(e) => panic!("unexpected spawn error: {e}"),
        }
    }

    assert_eq!(spawned.len(), uthreads::MAX_THREADS - 1);
    assert!(matches!(
        uthreads::spawn(|| {}),
        Err(uthreads::UthreadError::NoFreeSlots)
    ));

    for tid in spawned {
        uthreads::terminate(tid).expect("cleanup terminate should succeed");
    }
}

/// Re-initializing an already-initialized library is rejected.
#[test]
fn double_init_is_rejected() {
    ensure_runtime();
    assert!(matches!(
        uthreads::init(1_000),
        Err(uthreads::UthreadError::AlreadyInitialized)
    ));
}
