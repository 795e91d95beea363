//! The subscription worker: bootstrap, process, reconnect, stop.
//!
//! One worker drives one consumer through one persistent subscription. The
//! worker bootstraps the subscription once, then loops opening the
//! subscription and processing messages until it is cancelled. A dropped
//! connection or a closed stream sends it straight back to reopening; there
//! is no backoff between attempts.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use eventweave_core::error::{DomainError, StoreError};
use eventweave_core::event::RecordedEvent;
use eventweave_core::metadata::MetadataScope;
use eventweave_core::registry::EventRegistry;
use eventweave_core::serializer::Serializer;
use eventweave_core::store::{
    NakAction, PersistentSubscription, StartPosition, SubscriptionInfo, SubscriptionMessage,
    SubscriptionSettings, SubscriptionStore,
};

use crate::consumer::Consumer;
use crate::contract::build_filter;
use crate::envelope::EventEnvelope;
use crate::error::SubscriptionError;
use crate::handle::WorkerHandle;

/// Default number of deliveries before a failing event is parked.
pub const DEFAULT_MAX_DELIVERY_RETRIES: u32 = 5;

/// Worker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Failing events delivered with a retry count below this are retried,
    /// the rest are parked.
    pub max_delivery_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_delivery_retries: DEFAULT_MAX_DELIVERY_RETRIES,
        }
    }
}

/// How to reject an event whose dispatch failed.
#[must_use]
pub fn nak_action(retry_count: u32, max_delivery_retries: u32) -> NakAction {
    if retry_count < max_delivery_retries {
        NakAction::Retry
    } else {
        NakAction::Park
    }
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Finding or creating the persistent subscription.
    Bootstrapping,
    /// The subscription exists; nothing is open yet.
    Subscribed,
    /// Connected and handling messages.
    Processing,
    /// The connection failed or the stream ended.
    Dropped,
    /// About to reopen the subscription.
    Reconnecting,
    /// Cancelled, or bootstrap failed. Terminal.
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bootstrapping => "bootstrapping",
            Self::Subscribed => "subscribed",
            Self::Processing => "processing",
            Self::Dropped => "dropped",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What bootstrap settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// Group name of the subscription the worker opens.
    pub group: String,
    /// Log position already handled by a retired predecessor.
    pub skip_position: Option<u64>,
    /// `false` if an existing subscription was reused.
    pub created: bool,
}

enum Flow {
    Cancelled,
    Dropped(String),
}

/// Runs one consumer against its persistent subscription.
pub struct SubscriptionWorker<C: Consumer> {
    consumer: Arc<C>,
    store: Arc<dyn SubscriptionStore>,
    serializer: Arc<dyn Serializer>,
    registry: EventRegistry<C::Event>,
    config: WorkerConfig,
    state: watch::Sender<WorkerState>,
}

impl<C: Consumer> fmt::Debug for SubscriptionWorker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionWorker")
            .field("group", &self.group())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<C: Consumer> SubscriptionWorker<C> {
    /// Creates a worker for `consumer`, decoding with the consumer's registry.
    pub fn new(
        consumer: C,
        store: Arc<dyn SubscriptionStore>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self::from_arc(Arc::new(consumer), store, serializer)
    }

    /// Creates a worker for a consumer the caller keeps a handle to.
    pub fn from_arc(
        consumer: Arc<C>,
        store: Arc<dyn SubscriptionStore>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        let registry = consumer.registry();
        let (state, _) = watch::channel(WorkerState::Bootstrapping);
        Self {
            consumer,
            store,
            serializer,
            registry,
            config: WorkerConfig::default(),
            state,
        }
    }

    /// Replaces the worker configuration.
    #[must_use]
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// The driven consumer.
    #[must_use]
    pub fn consumer(&self) -> &Arc<C> {
        &self.consumer
    }

    /// Group name of the worker's subscription.
    #[must_use]
    pub fn group(&self) -> String {
        self.consumer.contract().qualified_name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watches lifecycle changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WorkerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(group = %self.group(), from = %previous, to = %state, "worker state changed");
        }
    }

    /// Finds or creates the persistent subscription.
    ///
    /// An existing subscription with the worker's group name is reused as is.
    /// Otherwise the subscription is created with a filter over every
    /// contract the consumer's registry declares. If the contract names a
    /// predecessor that still exists, the new subscription starts at the
    /// predecessor's last known position, that position is recorded as the
    /// skip position, and the predecessor is deleted once the new
    /// subscription exists.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::NoContracts` if the registry declares no
    /// contract, and `SubscriptionError::Bootstrap` if a store call fails.
    pub async fn bootstrap(&self) -> Result<Bootstrap, SubscriptionError> {
        self.set_state(WorkerState::Bootstrapping);
        let contract = self.consumer.contract();
        let group = contract.qualified_name();
        let store_failed = |source: StoreError| SubscriptionError::Bootstrap {
            group: group.clone(),
            source,
        };

        let existing = self.store.list_subscriptions().await.map_err(store_failed)?;
        if existing.iter().any(|info| info.group_name == group) {
            info!(group = %group, "reusing existing subscription");
            return Ok(Bootstrap {
                group,
                skip_position: None,
                created: false,
            });
        }

        let filter = build_filter(&group, self.registry.contracts())?;
        let predecessor: Option<SubscriptionInfo> = contract
            .predecessor_name()
            .and_then(|name| existing.into_iter().find(|info| info.group_name == name));

        let (start, skip_position) = match &predecessor {
            Some(SubscriptionInfo {
                group_name,
                last_known_position: Some(position),
                ..
            }) => {
                info!(
                    group = %group,
                    predecessor = %group_name,
                    position,
                    "chaining from predecessor subscription"
                );
                (StartPosition::Position(*position), Some(*position))
            }
            Some(SubscriptionInfo { group_name, .. }) => {
                info!(
                    group = %group,
                    predecessor = %group_name,
                    "predecessor never acknowledged an event, starting from the beginning"
                );
                (StartPosition::Start, None)
            }
            None if contract.start_from_end => (StartPosition::End, None),
            None => (StartPosition::Start, None),
        };

        info!(group = %group, filter = %filter, start = ?start, "creating subscription");
        self.store
            .create_subscription(
                &group,
                SubscriptionSettings {
                    event_type_filter: filter,
                    start,
                },
            )
            .await
            .map_err(store_failed)?;

        if let Some(predecessor) = predecessor {
            self.store
                .delete_subscription(&predecessor.group_name)
                .await
                .map_err(store_failed)?;
            info!(group = %group, predecessor = %predecessor.group_name, "deleted predecessor subscription");
        }

        Ok(Bootstrap {
            group,
            skip_position,
            created: true,
        })
    }

    /// Bootstraps, then processes messages until `cancel` fires.
    ///
    /// Transport failures never end the loop; the worker reopens the
    /// subscription right away. Cancellation interrupts the wait for the next
    /// message but not a dispatch already in progress.
    ///
    /// # Errors
    ///
    /// Only bootstrap failures are returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SubscriptionError> {
        let bootstrap = tokio::select! {
            () = cancel.cancelled() => {
                self.set_state(WorkerState::Stopped);
                return Ok(());
            }
            result = self.bootstrap() => result,
        };
        let bootstrap = match bootstrap {
            Ok(bootstrap) => bootstrap,
            Err(err) => {
                error!(group = %self.group(), error = %err, "subscription bootstrap failed");
                self.set_state(WorkerState::Stopped);
                return Err(err);
            }
        };
        self.set_state(WorkerState::Subscribed);

        loop {
            let opened = tokio::select! {
                () = cancel.cancelled() => break,
                opened = self.store.open_subscription(&bootstrap.group) => opened,
            };

            let reason = match opened {
                Ok(subscription) => {
                    self.set_state(WorkerState::Processing);
                    match self.process(subscription, &bootstrap, &cancel).await {
                        Flow::Cancelled => break,
                        Flow::Dropped(reason) => reason,
                    }
                }
                Err(err) => err.to_string(),
            };

            self.set_state(WorkerState::Dropped);
            warn!(group = %bootstrap.group, reason = %reason, "subscription dropped, reconnecting");
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                break;
            }
            self.set_state(WorkerState::Reconnecting);
        }

        self.set_state(WorkerState::Stopped);
        info!(group = %bootstrap.group, "subscription worker stopped");
        Ok(())
    }

    /// Spawns [`SubscriptionWorker::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let state = self.subscribe_state();
        let group = self.group();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        WorkerHandle::new(group, cancel, state, task)
    }

    async fn process(
        &self,
        mut subscription: Box<dyn PersistentSubscription>,
        bootstrap: &Bootstrap,
        cancel: &CancellationToken,
    ) -> Flow {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => return Flow::Cancelled,
                message = subscription.next() => message,
            };

            match message {
                None => return Flow::Dropped("subscription stream ended".to_owned()),
                Some(Err(err)) => return Flow::Dropped(err.to_string()),
                Some(Ok(SubscriptionMessage::Confirmation { subscription_id })) => {
                    info!(group = %bootstrap.group, subscription_id = %subscription_id, "subscription confirmed");
                }
                Some(Ok(SubscriptionMessage::Event { event, retry_count })) => {
                    if let Err(err) = self
                        .handle_event(subscription.as_mut(), &event, retry_count, bootstrap)
                        .await
                    {
                        return Flow::Dropped(err.to_string());
                    }
                }
            }
        }
    }

    async fn handle_event(
        &self,
        subscription: &mut dyn PersistentSubscription,
        event: &RecordedEvent,
        retry_count: u32,
        bootstrap: &Bootstrap,
    ) -> Result<(), StoreError> {
        if bootstrap.skip_position == Some(event.log_position) {
            debug!(
                group = %bootstrap.group,
                position = event.log_position,
                "acknowledging event already handled by the predecessor"
            );
            return subscription.ack(event).await;
        }

        match self.dispatch(event).await {
            Ok(()) => subscription.ack(event).await,
            Err(err) => {
                let action = nak_action(retry_count, self.config.max_delivery_retries);
                warn!(
                    group = %bootstrap.group,
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    retry_count,
                    action = ?action,
                    error = %err,
                    "event dispatch failed"
                );
                subscription.nak(event, action, &err.to_string()).await
            }
        }
    }

    async fn dispatch(&self, event: &RecordedEvent) -> Result<(), DomainError> {
        let decoded =
            self.registry
                .decode(&event.event_type, &event.payload, self.serializer.as_ref())?;
        let metadata = MetadataScope::from_bytes(&event.metadata, self.serializer.as_ref())?;
        let envelope = EventEnvelope {
            event: decoded,
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            stream: event.stream.clone(),
            stream_position: event.stream_position,
            log_position: event.log_position,
            created: event.created,
            metadata,
        };
        self.consumer.consume(&envelope).await
    }
}
