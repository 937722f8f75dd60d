//! Abort-mode escalation tests.
//!
//! `FatalMode::Abort` ends the process, so each case runs in a forked child and the
//! parent checks how the child terminated.
//!
//! Platform Support:
//! - Unix/Linux/macOS: runs in a forked child
//! - Other platforms: tests are compiled out

#![cfg(unix)]

use flatentity::{
    BridgeConfig, EngineError, ErrorBridge, FatalMode, Fault, LastErrorCell, ProtocolViolation,
};
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, fork};
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::Arc;

/// Runs `work` in a forked child and returns how the child terminated.
fn run_in_child<F>(work: F) -> WaitStatus
where
    F: FnOnce(),
{
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => match waitpid(child, None) {
            Ok(status) => status,
            Err(e) => panic!("Failed to wait for child: {}", e),
        },
        Ok(ForkResult::Child) => {
            // Exiting normally means nothing escalated.
            let code = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(()) => 0,
                Err(_) => 101,
            };
            process::exit(code);
        }
        Err(e) => panic!("Fork failed: {}", e),
    }
}

fn abort_bridge() -> (Arc<LastErrorCell>, ErrorBridge) {
    let cell = Arc::new(LastErrorCell::new());
    let bridge = ErrorBridge::new(
        cell.clone(),
        BridgeConfig::default().fatal_mode(FatalMode::Abort),
    );
    (cell, bridge)
}

fn assert_aborted(status: WaitStatus) {
    match status {
        WaitStatus::Signaled(_, Signal::SIGABRT, _) => {}
        other => panic!("expected the child to abort, got {other:?}"),
    }
}

#[test]
fn test_unrecoverable_fault_without_slot_aborts() {
    let status = run_in_child(|| {
        let (_cell, bridge) = abort_bridge();
        bridge.run_with_output(None, || {
            Err(Fault::Engine(EngineError::fatal(10102, "out of disk")))
        });
    });
    assert_aborted(status);
}

#[test]
fn test_always_fatal_aborts_on_recoverable_fault() {
    let status = run_in_child(|| {
        let (_cell, bridge) = abort_bridge();
        bridge.run_always_fatal(|| -> Result<(), Fault> {
            Err(ProtocolViolation::NotCollecting.into())
        });
    });
    assert_aborted(status);
}

#[test]
fn test_panic_in_block_aborts() {
    let status = run_in_child(|| {
        let (_cell, bridge) = abort_bridge();
        bridge.run_fatal_only_if_unrecoverable(|| -> Result<(), Fault> {
            panic!("native invariant broken");
        });
    });
    assert_aborted(status);
}

#[test]
fn test_pending_fatal_engine_error_aborts() {
    let status = run_in_child(|| {
        let (cell, bridge) = abort_bridge();
        cell.publish(EngineError::fatal(10101, "corrupt page"));
        bridge.check_and_raise_if_fatal();
    });
    assert_aborted(status);
}

#[test]
fn test_recoverable_outcomes_do_not_abort() {
    let status = run_in_child(|| {
        let (cell, bridge) = abort_bridge();

        let mut out = None;
        let ok = bridge.run_with_output(Some(&mut out), || {
            Err(Fault::Engine(EngineError::recoverable(404, "not found")))
        });
        assert!(!ok && out.is_some());

        cell.publish(EngineError::recoverable(404, "not found"));
        bridge.check_and_raise_if_fatal();
        assert!(bridge.check_last_error().is_err());
    });
    assert!(matches!(status, WaitStatus::Exited(_, 0)));
}
