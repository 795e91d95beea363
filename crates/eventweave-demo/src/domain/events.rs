//! Domain events for the bank account context.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use eventweave_core::error::DomainError;
use eventweave_core::event::{Event, EventContract, EventSet};
use eventweave_core::registry::EventRegistry;

/// Namespace of every account event contract.
pub const NAMESPACE: &str = "Bank.Accounts";

/// Emitted when an account is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    /// The account holder.
    pub owner: String,
}

impl Event for AccountOpened {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("AccountOpened", 1).in_namespace(NAMESPACE));
}

/// First version of a deposit, amounts in whole units only.
///
/// Still found in old streams; read as [`FundsDeposited`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsDepositedV1 {
    /// Amount credited.
    pub amount: u32,
}

impl Event for FundsDepositedV1 {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("FundsDeposited", 1).in_namespace(NAMESPACE));
}

/// Emitted when money is credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsDeposited {
    /// Amount credited.
    pub amount: u64,
    /// Free-form payment reference.
    pub reference: Option<String>,
}

impl Event for FundsDeposited {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("FundsDeposited", 2).in_namespace(NAMESPACE));
}

impl From<FundsDepositedV1> for FundsDeposited {
    fn from(old: FundsDepositedV1) -> Self {
        Self {
            amount: u64::from(old.amount),
            reference: None,
        }
    }
}

/// Emitted when money is debited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsWithdrawn {
    /// Amount debited.
    pub amount: u64,
}

impl Event for FundsWithdrawn {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("FundsWithdrawn", 1).in_namespace(NAMESPACE));
}

/// Emitted when an account is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountClosed {
    /// Why the account was closed.
    pub reason: String,
}

impl Event for AccountClosed {
    const CONTRACT: Option<EventContract> =
        Some(EventContract::new("AccountClosed", 1).in_namespace(NAMESPACE));
}

/// Every event an account folds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    Opened(AccountOpened),
    Deposited(FundsDeposited),
    Withdrawn(FundsWithdrawn),
    Closed(AccountClosed),
}

impl From<AccountOpened> for AccountEvent {
    fn from(value: AccountOpened) -> Self {
        Self::Opened(value)
    }
}

impl From<FundsDeposited> for AccountEvent {
    fn from(value: FundsDeposited) -> Self {
        Self::Deposited(value)
    }
}

impl From<FundsWithdrawn> for AccountEvent {
    fn from(value: FundsWithdrawn) -> Self {
        Self::Withdrawn(value)
    }
}

impl From<AccountClosed> for AccountEvent {
    fn from(value: AccountClosed) -> Self {
        Self::Closed(value)
    }
}

impl EventSet for AccountEvent {
    fn event_type(&self) -> Cow<'static, str> {
        match self {
            Self::Opened(_) => AccountOpened::event_type(),
            Self::Deposited(_) => FundsDeposited::event_type(),
            Self::Withdrawn(_) => FundsWithdrawn::event_type(),
            Self::Closed(_) => AccountClosed::event_type(),
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        Ok(match self {
            Self::Opened(e) => serde_json::to_value(e)?,
            Self::Deposited(e) => serde_json::to_value(e)?,
            Self::Withdrawn(e) => serde_json::to_value(e)?,
            Self::Closed(e) => serde_json::to_value(e)?,
        })
    }

    fn register(registry: &mut EventRegistry<Self>) {
        registry
            .register::<AccountOpened>()
            .register::<FundsDeposited>()
            .register_upgrade::<FundsDepositedV1, FundsDeposited>()
            .register::<FundsWithdrawn>()
            .register::<AccountClosed>();
    }
}
