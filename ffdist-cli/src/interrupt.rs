//! Ctrl-C handling.
//!
//! Every interrupt maps onto the run's cancellation token. The process never
//! exits from here: `encode` returns once every worker has killed its child
//! and removed its partial output, so a resumed run can trust `out/`.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Forward Ctrl-C presses into `cancel` for the rest of the process.
pub fn install(cancel: CancellationToken) {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    tokio::spawn(watch(cancel, rx));
}

/// Cancel on the first interrupt; later ones only report that cleanup is
/// still running. Returns the number of interrupts seen once `interrupts`
/// closes.
pub async fn watch(cancel: CancellationToken, mut interrupts: mpsc::UnboundedReceiver<()>) -> usize {
    let mut seen = 0;
    while interrupts.recv().await.is_some() {
        seen += 1;
        if seen == 1 {
            warn!("Interrupted, stopping workers...");
            cancel.cancel();
        } else {
            warn!("Still stopping, waiting for workers to remove partial output");
        }
    }
    seen
}
