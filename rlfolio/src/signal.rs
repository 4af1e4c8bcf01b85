//! Interrupt handling.
use anyhow::Result;
use log::{info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

/// Raises `flag` on Ctrl-C.
///
/// The listener runs on a detached thread with its own single-threaded runtime,
/// so the training loops stay synchronous. They poll the flag between steps.
pub fn install_ctrl_c(flag: Arc<AtomicBool>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            rt.block_on(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Ctrl-C received, stopping after the current step");
                        flag.store(true, Ordering::SeqCst);
                    }
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
                }
            })
        })?;

    Ok(())
}
