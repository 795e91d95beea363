//! Persistent subscription groups.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use eventweave_core::error::StoreError;
use eventweave_core::event::RecordedEvent;
use eventweave_core::store::{
    NakAction, PersistentSubscription, SubscriptionInfo, SubscriptionMessage, SubscriptionStats,
};

use crate::memory_store::Shared;

/// Server-side state of one persistent subscription.
#[derive(Debug)]
pub(crate) struct Group {
    filter: Regex,
    /// Next log index to scan.
    cursor: usize,
    /// Events waiting for redelivery, with the retry count to deliver them with.
    retry: VecDeque<(usize, u32)>,
    /// Delivered events waiting for ack/nak.
    in_flight: HashMap<usize, u32>,
    pub(crate) parked: Vec<usize>,
    last_acked: Option<u64>,
    acknowledged: u64,
    /// Bumped whenever connections are dropped.
    generation: u64,
}

impl Group {
    pub(crate) fn new(filter: Regex, cursor: usize) -> Self {
        Self {
            filter,
            cursor,
            retry: VecDeque::new(),
            in_flight: HashMap::new(),
            parked: Vec::new(),
            last_acked: None,
            acknowledged: 0,
            generation: 0,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn info(&self, name: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            group_name: name.to_owned(),
            last_known_position: self.last_acked,
            stats: SubscriptionStats {
                acknowledged: self.acknowledged,
                parked: self.parked.len() as u64,
                in_flight: self.in_flight.len() as u64,
            },
        }
    }

    pub(crate) fn drop_connections(&mut self) {
        self.generation += 1;
        let mut in_flight: Vec<(usize, u32)> = self.in_flight.drain().collect();
        in_flight.sort_unstable();
        for (index, retry_count) in in_flight.into_iter().rev() {
            self.retry.push_front((index, retry_count + 1));
        }
    }

    fn next_delivery(&mut self, events: &[RecordedEvent]) -> Option<(usize, u32)> {
        if let Some((index, retry_count)) = self.retry.pop_front() {
            return Some((index, retry_count));
        }
        while self.cursor < events.len() {
            let index = self.cursor;
            self.cursor += 1;
            if self.filter.is_match(&events[index].event_type) {
                return Some((index, 0));
            }
        }
        None
    }
}

enum Poll {
    Ready(Option<Result<SubscriptionMessage, StoreError>>),
    Pending,
}

/// One client connection to a group.
pub(crate) struct MemorySubscription {
    shared: Arc<Shared>,
    group: String,
    id: String,
    generation: u64,
    confirmed: bool,
}

impl MemorySubscription {
    pub(crate) fn new(shared: Arc<Shared>, group: String, id: String, generation: u64) -> Self {
        Self {
            shared,
            group,
            id,
            generation,
            confirmed: false,
        }
    }

    fn poll(&mut self) -> Poll {
        let mut log = self.shared.lock();
        let log = &mut *log;
        let Some(group) = log.groups.get_mut(&self.group) else {
            debug!(group = %self.group, "subscription deleted, closing stream");
            return Poll::Ready(None);
        };
        if group.generation != self.generation {
            return Poll::Ready(None);
        }
        if !self.confirmed {
            self.confirmed = true;
            return Poll::Ready(Some(Ok(SubscriptionMessage::Confirmation {
                subscription_id: self.id.clone(),
            })));
        }
        match group.next_delivery(&log.events) {
            Some((index, retry_count)) => {
                group.in_flight.insert(index, retry_count);
                Poll::Ready(Some(Ok(SubscriptionMessage::Event {
                    event: log.events[index].clone(),
                    retry_count,
                })))
            }
            None => Poll::Pending,
        }
    }

    /// Runs `f` against the group if this connection is still live.
    fn with_group<T>(&self, f: impl FnOnce(&mut Group) -> T) -> Result<T, StoreError> {
        let mut log = self.shared.lock();
        let group = log
            .groups
            .get_mut(&self.group)
            .ok_or_else(|| StoreError::SubscriptionNotFound(self.group.clone()))?;
        if group.generation != self.generation {
            return Err(StoreError::Unavailable(format!(
                "connection {} was dropped",
                self.id
            )));
        }
        Ok(f(group))
    }
}

fn index_of(event: &RecordedEvent) -> usize {
    usize::try_from(event.log_position).unwrap_or(usize::MAX)
}

#[async_trait]
impl PersistentSubscription for MemorySubscription {
    async fn next(&mut self) -> Option<Result<SubscriptionMessage, StoreError>> {
        let shared = Arc::clone(&self.shared);
        loop {
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Poll::Ready(message) = self.poll() {
                return message;
            }
            notified.await;
        }
    }

    async fn ack(&mut self, event: &RecordedEvent) -> Result<(), StoreError> {
        let index = index_of(event);
        self.with_group(|group| {
            if group.in_flight.remove(&index).is_some() {
                group.acknowledged += 1;
                let position = event.log_position;
                group.last_acked = Some(group.last_acked.map_or(position, |p| p.max(position)));
            }
        })
    }

    async fn nak(
        &mut self,
        event: &RecordedEvent,
        action: NakAction,
        reason: &str,
    ) -> Result<(), StoreError> {
        let index = index_of(event);
        let requeued = self.with_group(|group| {
            let Some(retry_count) = group.in_flight.remove(&index) else {
                return false;
            };
            match action {
                NakAction::Retry => {
                    group.retry.push_back((index, retry_count + 1));
                    true
                }
                NakAction::Park => {
                    group.parked.push(index);
                    false
                }
            }
        })?;
        warn!(
            group = %self.group,
            position = event.log_position,
            action = ?action,
            reason,
            "event rejected by consumer"
        );
        if requeued {
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }
}
