//! Policies and reactions of the bank account context.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::warn;

use eventweave_commands::CommandBus;
use eventweave_core::error::DomainError;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::metadata::{CORRELATION_ID_KEY, MetadataScope};
use eventweave_subscriptions::{EventEnvelope, Policy, Reaction, SubscriptionContract};

use super::projections::SUBSCRIPTION_NAMESPACE;
use crate::domain::aggregates::Account;
use crate::domain::commands::Deposit;
use crate::domain::events::AccountEvent;

/// Payment reference of welcome bonus deposits.
pub const WELCOME_BONUS_REFERENCE: &str = "welcome-bonus";

/// Credits every newly opened account with a bonus.
#[derive(Debug, Clone, Copy)]
pub struct WelcomeBonus {
    /// Bonus amount.
    pub amount: u64,
}

impl Policy for WelcomeBonus {
    type Event = AccountEvent;
    type State = Account;
    type Command = Deposit;

    fn contract(&self) -> SubscriptionContract {
        SubscriptionContract::new("WelcomeBonus", 1).in_namespace(SUBSCRIPTION_NAMESPACE)
    }

    fn decide(&self, envelope: &EventEnvelope<AccountEvent>) -> Vec<(AggregateIdentifier, Deposit)> {
        match envelope.event {
            AccountEvent::Opened(_) if self.amount > 0 => vec![(
                envelope.stream.clone(),
                Deposit {
                    amount: self.amount,
                    reference: Some(WELCOME_BONUS_REFERENCE.to_owned()),
                },
            )],
            _ => Vec::new(),
        }
    }
}

/// Warns about withdrawals at or above a threshold.
#[derive(Debug)]
pub struct LargeWithdrawalAlert {
    threshold: u64,
    raised: AtomicU64,
}

impl LargeWithdrawalAlert {
    /// Creates an alert for withdrawals of at least `threshold`.
    #[must_use]
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            raised: AtomicU64::new(0),
        }
    }

    /// Number of alerts raised so far.
    #[must_use]
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Reaction for LargeWithdrawalAlert {
    type Event = AccountEvent;

    fn contract(&self) -> SubscriptionContract {
        SubscriptionContract::new("LargeWithdrawalAlert", 1)
            .in_namespace(SUBSCRIPTION_NAMESPACE)
            .from_end()
    }

    async fn react(
        &self,
        envelope: &EventEnvelope<AccountEvent>,
        _bus: &CommandBus,
        metadata: &MetadataScope,
    ) -> Result<(), DomainError> {
        match &envelope.event {
            AccountEvent::Withdrawn(withdrawn) if withdrawn.amount >= self.threshold => {
                self.raised.fetch_add(1, Ordering::Relaxed);
                warn!(
                    account = %envelope.stream,
                    amount = withdrawn.amount,
                    correlation_id = metadata.get_str(CORRELATION_ID_KEY),
                    "large withdrawal"
                );
            }
            _ => {}
        }
        Ok(())
    }
}
