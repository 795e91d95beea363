//! Account state.

use eventweave_core::metadata::{MetadataScope, Multiplicity};
use eventweave_core::state::State;

use super::events::AccountEvent;

/// Metadata key under which committed events carry the account holder.
pub const ACCOUNT_OWNER_KEY: &str = "account_owner";

/// Folded state of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    /// The holder, once opened.
    pub owner: Option<String>,
    /// Current balance.
    pub balance: u64,
    /// Number of deposits and withdrawals.
    pub transactions: u32,
    /// Whether the account was closed.
    pub closed: bool,
}

impl Account {
    /// Returns `true` if the account accepts transactions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.owner.is_some() && !self.closed
    }
}

impl State for Account {
    type Event = AccountEvent;

    fn initial() -> Self {
        Self::default()
    }

    fn apply(&self, event: &Self::Event) -> Self {
        let mut next = self.clone();
        match event {
            AccountEvent::Opened(e) => next.owner = Some(e.owner.clone()),
            AccountEvent::Deposited(e) => {
                next.balance = next.balance.saturating_add(e.amount);
                next.transactions += 1;
            }
            AccountEvent::Withdrawn(e) => {
                next.balance = next.balance.saturating_sub(e.amount);
                next.transactions += 1;
            }
            AccountEvent::Closed(_) => next.closed = true,
        }
        next
    }

    fn seed_metadata(&self, metadata: &mut MetadataScope) {
        if let Some(owner) = &self.owner {
            metadata.add(ACCOUNT_OWNER_KEY, owner.as_str(), Multiplicity::Single);
        }
    }
}
