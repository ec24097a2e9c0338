use tokio::sync::watch;

/// Resolve once shutdown has been requested, or once the sender is gone.
///
/// Safe to use as a `tokio::select!` branch: a change to `false` keeps
/// waiting instead of completing the branch.
pub async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
