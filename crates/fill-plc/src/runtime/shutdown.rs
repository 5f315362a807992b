use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::warn;

/// Raise `stop` on Ctrl-C. The control thread polls the flag once per
/// iteration and switches every output off itself.
pub fn install_ctrl_c(stop: Arc<AtomicBool>) -> io::Result<thread::JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Operator abort requested, stopping batch");
                        stop.store(true, Ordering::Relaxed);
                    }
                    Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
                }
            })
        })
}
