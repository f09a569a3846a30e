//! Routes Ctrl-C into a build's cancel token.
//!
//! The signal handler only flips an atomic; a watcher thread turns that into
//! `CancelToken::cancel`, which runs the coordinator's cancel handlers. A
//! second Ctrl-C after cancellation exits immediately.

use anyhow::{Context, Result};
use idf_workflow::CancelToken;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
const WATCH_INTERVAL: Duration = Duration::from_millis(100);
const EXIT_INTERRUPTED: i32 = 130;

extern "C" fn on_sigint(_: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn install(cancel: &CancelToken) -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to a static atomic, which is async-signal-safe.
    unsafe { sigaction(Signal::SIGINT, &action) }.context("Failed to install SIGINT handler")?;

    let cancel = cancel.clone();
    std::thread::Builder::new()
        .name("sigint-watch".to_string())
        .spawn(move || loop {
            std::thread::sleep(WATCH_INTERVAL);
            if !INTERRUPTED.swap(false, Ordering::SeqCst) {
                continue;
            }
            if on_interrupt(&cancel) == Interrupt::Exit {
                std::process::exit(EXIT_INTERRUPTED);
            }
        })
        .context("Failed to spawn SIGINT watcher")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Exit,
}

/// First interrupt cancels the build; one arriving after that asks to exit.
fn on_interrupt(cancel: &CancelToken) -> Interrupt {
    if cancel.is_cancelled() {
        log::warn!("⛔ Interrupted again, exiting");
        return Interrupt::Exit;
    }
    log::warn!("⛔ Interrupt received, cancelling build (Ctrl-C again to exit)");
    cancel.cancel();
    Interrupt::Cancelled
}
