use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Pure observer of platform online/offline signals. Readers consult
/// [`ConnectivityMonitor::is_online`] synchronously at each decision point.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state: Arc::new(state) }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn apply(&self, event: ConnectivityEvent) {
        let online = matches!(event, ConnectivityEvent::Online);
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::warn!("Connectivity lost; network actions are paused");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Forwards events from a platform signal source until it closes.
    pub fn listen(&self, mut events: mpsc::Receiver<ConnectivityEvent>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                monitor.apply(event);
            }
            tracing::debug!("Connectivity signal source closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_tracks_latest_transition() {
        let monitor = ConnectivityMonitor::new(true);
        monitor.apply(ConnectivityEvent::Offline);
        assert!(!monitor.is_online());
        monitor.apply(ConnectivityEvent::Online);
        assert!(monitor.is_online());
    }

    #[test]
    fn clones_share_state() {
        let monitor = ConnectivityMonitor::new(true);
        let observer = monitor.clone();
        monitor.apply(ConnectivityEvent::Offline);
        assert!(!observer.is_online());
    }

    #[tokio::test]
    async fn subscribers_only_see_real_transitions() {
        let monitor = ConnectivityMonitor::new(true);
        let mut receiver = monitor.subscribe();

        monitor.apply(ConnectivityEvent::Online);
        assert!(!receiver.has_changed().unwrap());

        monitor.apply(ConnectivityEvent::Offline);
        assert!(receiver.has_changed().unwrap());
        assert!(!*receiver.borrow_and_update());
    }

    #[tokio::test]
    async fn listen_applies_events_from_source() {
        let monitor = ConnectivityMonitor::new(true);
        let (tx, rx) = mpsc::channel(4);
        let handle = monitor.listen(rx);

        tx.send(ConnectivityEvent::Offline).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(!monitor.is_online());
    }
}
