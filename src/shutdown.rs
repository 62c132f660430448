//! Process-wide stop signal
//!
//! One [`Shutdown`] owns the trigger; every long-lived task holds a cloned
//! [`ShutdownSignal`] and selects on [`ShutdownSignal::recv`].

use tokio::sync::watch;

/// Owning side of the stop signal
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Observing side of the stop signal, cheap to clone
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Tell every holder of a [`ShutdownSignal`] to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the stop signal fires (or its owner is dropped)
    pub async fn recv(&mut self) {
        // wait_for only errors when the sender is gone, which also means stop
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
