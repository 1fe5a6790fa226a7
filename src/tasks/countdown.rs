use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Background ticker owned by a running quiz. Dropping it stops the ticks.
#[derive(Debug)]
pub(crate) struct Countdown {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Calls `on_tick` once per `period`, first after one full period, until it
    /// breaks or the countdown is cancelled.
    pub(crate) fn spawn<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (cancel, mut cancelled) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *cancelled.borrow() {
                    break;
                }

                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {
                        if on_tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Countdown stopped");
        });

        Self { cancel, handle }
    }

    pub(crate) fn cancel(&self) {
        if self.cancel.send(true).is_err() {
            tracing::debug!("Countdown already stopped");
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
    }
}
