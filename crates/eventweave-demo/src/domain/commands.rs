//! Commands for the bank account context.

use async_trait::async_trait;

use eventweave_core::command::{Command, CommandKind, EventSink};
use eventweave_core::error::DomainError;
use eventweave_core::metadata::{MetadataScope, Multiplicity};

use super::aggregates::Account;
use super::events::{AccountClosed, AccountOpened, FundsDeposited, FundsWithdrawn};

fn ensure_active(account: &Account) -> Result<(), DomainError> {
    if account.owner.is_none() {
        return Err(DomainError::Validation("account is not open".into()));
    }
    if account.closed {
        return Err(DomainError::Validation("account is closed".into()));
    }
    Ok(())
}

/// Opens a new account.
#[derive(Debug, Clone)]
pub struct OpenAccount {
    /// The account holder.
    pub owner: String,
}

#[async_trait]
impl Command<Account> for OpenAccount {
    const KIND: CommandKind = CommandKind::Create;

    fn command_type(&self) -> &'static str {
        "account.open"
    }

    async fn execute(&self, sink: &mut EventSink<Account>) -> Result<(), DomainError> {
        if self.owner.trim().is_empty() {
            return Err(DomainError::Validation("owner must not be empty".into()));
        }
        if sink.state().owner.is_some() {
            return Err(DomainError::Validation("account is already open".into()));
        }
        sink.emit(AccountOpened {
            owner: self.owner.clone(),
        });
        Ok(())
    }
}

/// Credits an account.
#[derive(Debug, Clone)]
pub struct Deposit {
    /// Amount to credit.
    pub amount: u64,
    /// Optional payment reference.
    pub reference: Option<String>,
}

#[async_trait]
impl Command<Account> for Deposit {
    fn command_type(&self) -> &'static str {
        "account.deposit"
    }

    fn seed_metadata(&self, metadata: &mut MetadataScope) {
        if let Some(reference) = &self.reference {
            metadata.add("payment_reference", reference.as_str(), Multiplicity::Single);
        }
    }

    async fn execute(&self, sink: &mut EventSink<Account>) -> Result<(), DomainError> {
        ensure_active(sink.state())?;
        if self.amount == 0 {
            return Err(DomainError::Validation("deposit must be positive".into()));
        }
        sink.emit(FundsDeposited {
            amount: self.amount,
            reference: self.reference.clone(),
        });
        Ok(())
    }
}

/// Debits an account.
#[derive(Debug, Clone)]
pub struct Withdraw {
    /// Amount to debit.
    pub amount: u64,
}

#[async_trait]
impl Command<Account> for Withdraw {
    fn command_type(&self) -> &'static str {
        "account.withdraw"
    }

    async fn execute(&self, sink: &mut EventSink<Account>) -> Result<(), DomainError> {
        ensure_active(sink.state())?;
        let balance = sink.state().balance;
        if self.amount > balance {
            return Err(DomainError::Validation(format!(
                "insufficient funds: balance {balance}, requested {}",
                self.amount
            )));
        }
        sink.emit(FundsWithdrawn {
            amount: self.amount,
        });
        Ok(())
    }
}

/// Closes an account, paying out whatever is left.
#[derive(Debug, Clone)]
pub struct CloseAccount {
    /// Why the account is closed.
    pub reason: String,
}

#[async_trait]
impl Command<Account> for CloseAccount {
    fn command_type(&self) -> &'static str {
        "account.close"
    }

    async fn execute(&self, sink: &mut EventSink<Account>) -> Result<(), DomainError> {
        ensure_active(sink.state())?;
        let remaining = sink.state().balance;
        if remaining > 0 {
            sink.emit(FundsWithdrawn { amount: remaining });
        }
        // The payout above is already folded, so the account closes empty.
        debug_assert_eq!(sink.state().balance, 0);
        sink.emit(AccountClosed {
            reason: self.reason.clone(),
        });
        Ok(())
    }
}
