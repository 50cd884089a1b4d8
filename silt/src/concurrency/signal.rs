use tokio::sync::watch;

/// Transmitter side of a coordination signal channel.
///
/// The signal carries no payload; it only notifies that some event occurred.
/// Consumers use it to nudge the flush orchestrator when a buffer crosses its
/// size thresholds.
pub type SignalTx = watch::Sender<()>;

/// Receiver side of a coordination signal channel.
pub type SignalRx = watch::Receiver<()>;

/// Creates a new coordination signal channel.
///
/// Repeated signals between polls coalesce into one wake-up.
pub fn create_signal() -> (SignalTx, SignalRx) {
    watch::channel(())
}
