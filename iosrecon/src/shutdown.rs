//! Process-wide shutdown signalling.
//!
//! A [`ShutdownTrigger`] is held by whoever reacts to Ctrl-C / SIGTERM; every
//! in-flight exchange holds a [`Shutdown`] and aborts its read when the
//! trigger fires.

use tokio::sync::watch;

/// Sending half. Dropping it does not count as a shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, cheap to clone into every session.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Signal every [`Shutdown`] handle.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Get another receiving handle.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    /// A handle that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the value observable without a live sender.
        drop(tx);
        Self { rx }
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    ///
    /// Pends forever if the trigger was dropped without firing.
    pub async fn cancelled(&mut self) {
        loop {
            let fired = *self.rx.borrow_and_update();
            if fired {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::never()
    }
}
