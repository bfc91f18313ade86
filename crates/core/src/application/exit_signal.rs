// Child exit signal
//
// Raised by the orchestrator once the child is reaped; observed by the
// resource sampler loops so they stop instead of polling a dead pid.

use tokio::sync::watch;

/// Observer side, cheap to clone into every sampler loop
#[derive(Clone)]
pub struct ExitWatch {
    rx: watch::Receiver<bool>,
}

impl ExitWatch {
    /// Check if the child has exited
    pub fn has_exited(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the child has exited
    ///
    /// Returns immediately if it already has. A dropped notifier counts as exit.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|exited| *exited).await;
    }
}

/// Notifier side, owned by the orchestrator
pub struct ExitNotifier {
    tx: watch::Sender<bool>,
}

impl ExitNotifier {
    /// Signal that the child is gone
    pub fn notify_exited(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for ExitNotifier {
    fn drop(&mut self) {
        // Supervisor task ending (normally or by panic) always releases watchers
        let _ = self.tx.send(true);
    }
}

/// Create an exit signal pair
pub fn exit_channel() -> (ExitNotifier, ExitWatch) {
    let (tx, rx) = watch::channel(false);
    (ExitNotifier { tx }, ExitWatch { rx })
}
