use tokio::sync::watch;

/// Transmitter side of the shutdown token.
///
/// Sending `true` asks every consumer to finish its in-flight message and stop
/// reading, and asks the flush orchestrator to drain once and exit.
pub type ShutdownTx = watch::Sender<bool>;

/// Receiver side of the shutdown token.
pub type ShutdownRx = watch::Receiver<bool>;

/// Creates a new shutdown channel in the "running" state.
pub fn create_shutdown() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Returns once shutdown has been requested.
///
/// Resolves immediately when the transmitter is dropped, which only happens on
/// teardown paths where stopping is the right answer anyway.
pub async fn wait_for_shutdown(rx: &mut ShutdownRx) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_signal_is_observed() {
        let (tx, mut rx) = create_shutdown();
        assert!(!*rx.borrow());

        tx.send(true).unwrap();
        wait_for_shutdown(&mut rx).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn dropped_transmitter_unblocks_waiters() {
        let (tx, mut rx) = create_shutdown();
        drop(tx);
        wait_for_shutdown(&mut rx).await;
    }
}
