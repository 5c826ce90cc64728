//! Re-advertise this peer when the host decides it is behind NAT.
//!
//! Once the host classifies itself `Private` it goes looking for a relay
//! circuit, which changes the address set it advertises. After a settle
//! delay we publish again so the directory holds the relay-derived addresses.
//!
//! By default the watcher handles exactly one reachability event and then
//! stops; later flapping is not re-advertised unless `rearm` is set.

use std::sync::Arc;
use std::time::Duration;

use burrow_core::wire::Namespace;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::host::Reachability;
use crate::routing::ContentRouting;

pub struct ReachabilityWatcher {
    routing: Arc<dyn ContentRouting>,
    namespace: Namespace,
    settle: Duration,
    rearm: bool,
}

impl ReachabilityWatcher {
    pub fn new(routing: Arc<dyn ContentRouting>, namespace: Namespace, settle: Duration) -> Self {
        Self {
            routing,
            namespace,
            settle,
            rearm: false,
        }
    }

    /// Keep handling events for the lifetime of the subscription.
    pub fn rearm(mut self, rearm: bool) -> Self {
        self.rearm = rearm;
        self
    }

    pub fn spawn(self, events: broadcast::Receiver<Reachability>) -> JoinHandle<usize> {
        tokio::spawn(self.run(events))
    }

    /// Consume reachability events. Returns how many times it re-advertised.
    pub async fn run(self, mut events: broadcast::Receiver<Reachability>) -> usize {
        let mut published = 0;
        loop {
            let next = match events.recv().await {
                Ok(next) => next,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "reachability events lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            tracing::info!(reachability = %next, "reachability event");

            if next == Reachability::Private {
                tokio::time::sleep(self.settle).await;
                match self.routing.provide(&self.namespace, true).await {
                    Ok(()) => {
                        published += 1;
                        tracing::info!(namespace = %self.namespace, "re-advertised after going private");
                    }
                    Err(e) => tracing::warn!(error = %e, "re-advertise failed"),
                }
            }

            if !self.rearm {
                break;
            }
        }
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{provider_channel, ProviderStream, RouteError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct CountingRouting {
        provides: AtomicUsize,
    }

    #[async_trait]
    impl ContentRouting for CountingRouting {
        async fn provide(&self, _ns: &Namespace, bcast: bool) -> Result<(), RouteError> {
            assert!(bcast);
            self.provides.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn find_providers(&self, _ns: &Namespace, cancel: &CancellationToken) -> ProviderStream {
            provider_channel(1, cancel).1
        }
    }

    fn watcher(routing: &Arc<CountingRouting>) -> ReachabilityWatcher {
        ReachabilityWatcher::new(
            routing.clone(),
            Namespace::derive("clients"),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn private_transition_triggers_one_provide() {
        let routing = Arc::new(CountingRouting::default());
        let (tx, rx) = broadcast::channel(8);
        let handle = watcher(&routing).spawn(rx);

        tx.send(Reachability::Private).unwrap();
        assert_eq!(handle.await.unwrap(), 1);
        assert_eq!(routing.provides.load(Ordering::SeqCst), 1);
    }

    // Known limitation: without rearm, later flapping is ignored.
    #[tokio::test]
    async fn one_shot_ignores_later_events() {
        let routing = Arc::new(CountingRouting::default());
        let (tx, rx) = broadcast::channel(8);
        tx.send(Reachability::Public).unwrap();
        tx.send(Reachability::Private).unwrap();

        assert_eq!(watcher(&routing).run(rx).await, 0);
        assert_eq!(routing.provides.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rearmed_watcher_handles_every_private_transition() {
        let routing = Arc::new(CountingRouting::default());
        let (tx, rx) = broadcast::channel(8);
        let handle = watcher(&routing).rearm(true).spawn(rx);

        for r in [
            Reachability::Private,
            Reachability::Public,
            Reachability::Private,
        ] {
            tx.send(r).unwrap();
        }
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(routing.provides.load(Ordering::SeqCst), 2);
    }
}
