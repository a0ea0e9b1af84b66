//! Closed-group swarm poller.
//!
//! While active, every [`POLL_INTERVAL`] the poller fetches messages for each
//! closed group from one randomly chosen snode of that group's swarm,
//! decrypts them and hands them to the [`MessageSink`]. Group chains run
//! concurrently and fail independently.
//!
//! Stopping does not abort in-flight network calls. Each chain checks the
//! polling flag once its swarm lookup completes and after its messages are
//! fetched, and discards its work if the poller has gone idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::seq::IteratorRandom;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::errors::NetworkError;
use crate::network::{MessageSink, SwarmApi};
use crate::session::SessionProtocol;
use crate::store::ClosedGroupKeyStore;

/// Default time between poll cycles.
pub const POLL_INTERVAL: Duration = Duration::from_millis(4000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("no snodes available in swarm")]
    InsufficientSnodes,
    #[error("polling was stopped")]
    PollingCanceled,
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
}

/// Result of polling a single group in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPollOutcome {
    pub group_public_key: String,
    /// Number of messages delivered to the sink
    pub result: Result<usize, PollError>,
}

/// Collaborators a poller is built from.
#[derive(Clone)]
pub struct PollerDependencies {
    pub groups: Arc<dyn ClosedGroupKeyStore>,
    pub swarm: Arc<dyn SwarmApi>,
    pub protocol: Arc<SessionProtocol>,
    pub sink: Arc<dyn MessageSink>,
    pub interval: Duration,
}

struct PollerShared {
    groups: Arc<dyn ClosedGroupKeyStore>,
    swarm: Arc<dyn SwarmApi>,
    protocol: Arc<SessionProtocol>,
    sink: Arc<dyn MessageSink>,
    interval: Duration,
    is_polling: AtomicBool,
}

impl PollerShared {
    fn is_polling(&self) -> bool {
        self.is_polling.load(Ordering::Acquire)
    }

    async fn poll(self: Arc<Self>) -> Vec<GroupPollOutcome> {
        if !self.is_polling() {
            return Vec::new();
        }

        let mut tasks = JoinSet::new();
        for group_public_key in self.groups.all_closed_group_public_keys() {
            let shared = Arc::clone(&self);
            tasks.spawn(async move {
                let result = shared.poll_group(&group_public_key).await;
                if let Err(e) = &result {
                    debug!(group = %group_public_key, error = %e, "Polling failed for closed group");
                }
                GroupPollOutcome {
                    group_public_key,
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "Closed group poll task failed"),
            }
        }
        outcomes
    }

    async fn poll_group(&self, group_public_key: &str) -> Result<usize, PollError> {
        let swarm = self.swarm.get_swarm(group_public_key).await?;
        let snode = swarm
            .into_iter()
            .choose(&mut OsRng)
            .ok_or(PollError::InsufficientSnodes)?;
        if !self.is_polling() {
            return Err(PollError::PollingCanceled);
        }

        let raw = self.swarm.get_raw_messages(&snode, group_public_key).await?;
        let envelopes = self
            .swarm
            .parse_raw_messages_response(raw, &snode, group_public_key);
        if !self.is_polling() {
            return Err(PollError::PollingCanceled);
        }

        if !envelopes.is_empty() {
            debug!(
                group = %group_public_key,
                snode = %snode,
                count = envelopes.len(),
                "Received new messages in closed group"
            );
        }

        let mut delivered = 0;
        for envelope in &envelopes {
            match self.protocol.decrypt(envelope) {
                Ok(message) => {
                    self.sink.process(envelope, message);
                    delivered += 1;
                }
                Err(e) => {
                    warn!(group = %group_public_key, error = %e, "Dropping undecryptable closed group message");
                }
            }
        }
        Ok(delivered)
    }
}

/// Periodic poller for every closed group in the key store.
pub struct ClosedGroupPoller {
    shared: Arc<PollerShared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ClosedGroupPoller {
    pub fn new(deps: PollerDependencies) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                groups: deps.groups,
                swarm: deps.swarm,
                protocol: deps.protocol,
                sink: deps.sink,
                interval: deps.interval,
                is_polling: AtomicBool::new(false),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.shared.is_polling()
    }

    /// Start the repeating poll timer unless already polling.
    ///
    /// The first cycle runs immediately. Must be called from within a Tokio
    /// runtime.
    pub fn start_if_needed(&self) {
        let mut timer = self.timer.lock();
        if self.shared.is_polling.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(interval_ms = self.shared.interval.as_millis() as u64, "Started polling closed groups");

        let shared = Arc::clone(&self.shared);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !shared.is_polling() {
                    break;
                }
                // Cycles are detached so a slow chain never delays the timer
                tokio::spawn(Arc::clone(&shared).poll());
            }
        }));
    }

    /// Stop the repeating timer. In-flight chains finish their current
    /// network call and then discard their results.
    pub fn stop_if_needed(&self) {
        let mut timer = self.timer.lock();
        if self.shared.is_polling.swap(false, Ordering::AcqRel) {
            info!("Stopped polling closed groups");
        }
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }

    /// Run a single cycle without the repeating timer.
    ///
    /// Returns an empty list without polling if the poller is already active.
    pub async fn poll_once(&self) -> Vec<GroupPollOutcome> {
        if self.shared.is_polling.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        let outcomes = Arc::clone(&self.shared).poll().await;

        let timer = self.timer.lock();
        if timer.is_none() {
            self.shared.is_polling.store(false, Ordering::Release);
        }
        outcomes
    }
}

impl Drop for ClosedGroupPoller {
    fn drop(&mut self) {
        self.shared.is_polling.store(false, Ordering::Release);
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Process-wide holder for the one closed-group poller.
#[derive(Default)]
pub struct PollerRegistry {
    poller: OnceLock<Arc<ClosedGroupPoller>>,
}

impl PollerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the poller on first call; later calls return the existing one
    /// and ignore `deps`.
    pub fn configure_if_needed(&self, deps: PollerDependencies) -> Arc<ClosedGroupPoller> {
        Arc::clone(
            self.poller
                .get_or_init(|| Arc::new(ClosedGroupPoller::new(deps))),
        )
    }

    pub fn shared(&self) -> Option<Arc<ClosedGroupPoller>> {
        self.poller.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{MockSwarm, RecordingSink, TestGroup};
    use crate::store::InMemoryStore;
    use veil_crypto::identity::IdentityKeyMaterial;

    struct Fixture {
        store: InMemoryStore,
        swarm: Arc<MockSwarm>,
        sink: Arc<RecordingSink>,
        sender: IdentityKeyMaterial,
    }

    impl Fixture {
        fn new(swarm: MockSwarm) -> Self {
            Self {
                store: InMemoryStore::new(),
                swarm: Arc::new(swarm),
                sink: Arc::new(RecordingSink::new()),
                sender: IdentityKeyMaterial::generate().unwrap(),
            }
        }

        fn deps(&self) -> PollerDependencies {
            PollerDependencies {
                groups: Arc::new(self.store.clone()),
                swarm: self.swarm.clone(),
                protocol: Arc::new(SessionProtocol::new(
                    Arc::new(self.store.clone()),
                    Arc::new(self.store.clone()),
                )),
                sink: self.sink.clone(),
                interval: POLL_INTERVAL,
            }
        }

        fn poller(&self) -> ClosedGroupPoller {
            ClosedGroupPoller::new(self.deps())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let fixture = Fixture::new(MockSwarm::new());
        let group = TestGroup::join(&fixture.store);
        fixture.swarm.set_swarm(&group.public_key, MockSwarm::single_snode());

        let poller = fixture.poller();
        poller.start_if_needed();
        poller.start_if_needed();
        assert!(poller.is_polling());

        // Ticks at 0, 4000 and 8000 ms
        tokio::time::sleep(POLL_INTERVAL * 2 + Duration::from_millis(100)).await;
        assert_eq!(fixture.swarm.swarm_calls(), 3);

        poller.stop_if_needed();
        assert!(!poller.is_polling());
        tokio::time::sleep(POLL_INTERVAL * 3).await;
        assert_eq!(fixture.swarm.swarm_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight_chain() {
        let fixture = Fixture::new(MockSwarm::new().with_swarm_delay(Duration::from_millis(1000)));
        let group = TestGroup::join(&fixture.store);
        fixture.swarm.set_swarm(&group.public_key, MockSwarm::single_snode());
        fixture
            .swarm
            .push_message(&group.public_key, group.seal(&fixture.sender, b"late"));

        let poller = fixture.poller();
        poller.start_if_needed();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fixture.swarm.swarm_calls(), 1);

        poller.stop_if_needed();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fixture.swarm.swarm_calls(), 1);
        assert_eq!(fixture.swarm.message_calls(), 0);
        assert_eq!(fixture.sink.count(), 0);
    }

    #[tokio::test]
    async fn test_groups_fail_independently() {
        let fixture = Fixture::new(MockSwarm::new());
        let empty = TestGroup::join(&fixture.store);
        let healthy = TestGroup::join(&fixture.store);
        fixture.swarm.set_swarm(&empty.public_key, Vec::new());
        fixture.swarm.set_swarm(&healthy.public_key, MockSwarm::single_snode());
        fixture
            .swarm
            .push_message(&healthy.public_key, healthy.seal(&fixture.sender, b"one"));
        fixture
            .swarm
            .push_message(&healthy.public_key, healthy.seal(&fixture.sender, b"two"));

        let poller = fixture.poller();
        let mut outcomes = poller.poll_once().await;
        outcomes.sort_by_key(|outcome| outcome.group_public_key != empty.public_key);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].result, Err(PollError::InsufficientSnodes));
        assert_eq!(outcomes[1].result, Ok(2));

        let received = fixture.sink.messages();
        assert_eq!(received.len(), 2);
        assert!(received
            .iter()
            .all(|(_, message)| message.sender_session_id == fixture.sender.session_id()));
        assert!(!poller.is_polling());
    }

    #[tokio::test]
    async fn test_undecryptable_messages_are_skipped() {
        let fixture = Fixture::new(MockSwarm::new());
        let group = TestGroup::join(&fixture.store);
        fixture.swarm.set_swarm(&group.public_key, MockSwarm::single_snode());
        fixture.swarm.push_message(&group.public_key, vec![0u8; 150]);
        fixture
            .swarm
            .push_message(&group.public_key, group.seal(&fixture.sender, b"good"));

        let outcomes = fixture.poller().poll_once().await;
        assert_eq!(outcomes[0].result, Ok(1));
        assert_eq!(fixture.sink.messages()[0].1.plaintext, b"good");
    }

    #[tokio::test]
    async fn test_swarm_failure_is_reported() {
        let fixture = Fixture::new(MockSwarm::new());
        let group = TestGroup::join(&fixture.store);
        fixture.swarm.fail_swarm(&group.public_key);

        let outcomes = fixture.poller().poll_once().await;
        assert!(matches!(outcomes[0].result, Err(PollError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_once_while_polling_is_noop() {
        let fixture = Fixture::new(MockSwarm::new());
        let group = TestGroup::join(&fixture.store);
        fixture.swarm.set_swarm(&group.public_key, MockSwarm::single_snode());

        let poller = fixture.poller();
        poller.start_if_needed();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let calls = fixture.swarm.swarm_calls();

        assert!(poller.poll_once().await.is_empty());
        assert_eq!(fixture.swarm.swarm_calls(), calls);
        assert!(poller.is_polling());
        poller.stop_if_needed();
    }

    #[tokio::test]
    async fn test_no_groups_no_requests() {
        let fixture = Fixture::new(MockSwarm::new());
        assert!(fixture.poller().poll_once().await.is_empty());
        assert_eq!(fixture.swarm.swarm_calls(), 0);
    }

    #[tokio::test]
    async fn test_registry_configures_once() {
        let first = Fixture::new(MockSwarm::new());
        let second = Fixture::new(MockSwarm::new());
        let registry = PollerRegistry::new();
        assert!(registry.shared().is_none());

        let a = registry.configure_if_needed(first.deps());
        let b = registry.configure_if_needed(second.deps());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &registry.shared().unwrap()));
    }
}
