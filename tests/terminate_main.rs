//! `terminate(0)` calls `std::process::exit(1)`, which would tear down the
//! whole test harness if exercised in-process. Instead this test re-execs
//! its own binary as a child, marked by an environment variable, and
//! asserts the child's exit status.
use std::env;
use std::process::Command;

const MARKER: &str = "UTHREADS_TERMINATE_MAIN_CHILD";

#[test]
fn terminate_zero_exits_with_status_one() {
    if env::var_os(MARKER).is_some() {
        run_child_and_terminate();
        return;
    }

    let exe = env::current_exe().expect("current_exe should be available in a test binary");
    let status = Command::new(exe)
        .arg("--test-threads=1")
        .arg("--exact")
        .arg("terminate_zero_exits_with_status_one")
        .arg("--nocapture")
        .env(MARKER, "1")
        .status()
        .expect("failed to spawn child test process");

    assert_eq!(status.code(), Some(1));
}

fn run_child_and_terminate() {
    uthreads::init(50_000).expect("init should succeed in the child process");

    let worker = uthreads::spawn(|| loop {
        std::hint::spin_loop();
    })
    .expect("spawn should succeed");
    assert!(uthreads::get_quantums(worker).is_ok());

    // Never returns: exits the process with status 1.
    uthreads::terminate(0).expect("terminate(0) call itself should not fail validation");
    unreachable!("terminate(0) must exit the process");
}
