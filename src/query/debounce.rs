//! Trailing-edge debouncing of a rapidly changing value.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Publishes the latest pushed value once it has stopped changing for
/// `delay`.
///
/// Every push restarts the timer, so a burst of pushes yields exactly one
/// settled value: the last one. The background task stops when the debouncer
/// is cancelled or dropped; a value that has not settled by then is discarded.
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    output: watch::Receiver<T>,
    cancel: CancellationToken,
    delay: Duration,
}

impl<T> Debouncer<T>
where
    T: Send + Sync + 'static,
{
    /// Start a debouncer whose settled value begins as `initial`.
    pub fn new(initial: T, delay: Duration) -> Self {
        let (input, rx) = mpsc::unbounded_channel();
        let (tx, output) = watch::channel(initial);
        let cancel = CancellationToken::new();

        tokio::spawn(run(rx, tx, delay, cancel.clone()));

        Self {
            input,
            output,
            cancel,
            delay,
        }
    }

    /// Record a new raw value and restart the timer.
    pub fn push(&self, value: T) {
        if self.input.send(value).is_err() {
            trace!("debouncer already stopped, dropping value");
        }
    }

    /// Receiver of settled values.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.output.clone()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stop the timer. Pending values are never published.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The most recently settled value.
    pub fn current(&self) -> T {
        self.output.borrow().clone()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<T>(
    mut rx: mpsc::UnboundedReceiver<T>,
    tx: watch::Sender<T>,
    delay: Duration,
    cancel: CancellationToken,
) {
    let mut pending: Option<T> = None;
    let timer = tokio::time::sleep(delay);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(discarded = pending.is_some(), "debouncer cancelled");
                break;
            }
            value = rx.recv() => match value {
                Some(value) => {
                    pending = Some(value);
                    timer.as_mut().reset(tokio::time::Instant::now() + delay);
                }
                // Every handle is gone.
                None => break,
            },
            _ = &mut timer, if pending.is_some() => {
                if let Some(value) = pending.take() {
                    tx.send_replace(value);
                    trace!("debounced value settled");
                }
            }
        }
    }
}
