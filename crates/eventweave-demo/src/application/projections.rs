//! Read models over account events.

use eventweave_core::error::DomainError;
use eventweave_sql::{SqlBatch, SqlProjector, SqlStatement};
use eventweave_subscriptions::{EventEnvelope, FoldProjection, SubscriptionContract};

use crate::domain::aggregates::Account;
use crate::domain::events::AccountEvent;

/// Namespace of the context's subscription contracts.
pub const SUBSCRIPTION_NAMESPACE: &str = "Bank";

/// In-memory balances, one folded [`Account`] per account stream.
#[must_use]
pub fn balances() -> FoldProjection<Account> {
    FoldProjection::new(
        SubscriptionContract::new("Balances", 1).in_namespace(SUBSCRIPTION_NAMESPACE),
    )
}

/// Maintains the `account_balances` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountBalances;

impl SqlProjector for AccountBalances {
    type Event = AccountEvent;

    fn contract(&self) -> SubscriptionContract {
        SubscriptionContract::new("AccountBalances", 1).in_namespace(SUBSCRIPTION_NAMESPACE)
    }

    fn project(
        &self,
        envelope: &EventEnvelope<AccountEvent>,
        batch: &mut SqlBatch,
    ) -> Result<(), DomainError> {
        let account = envelope.stream.as_str();
        let statement = match &envelope.event {
            AccountEvent::Opened(e) => SqlStatement::text(
                "INSERT INTO account_balances (account_id, owner, balance) \
                 VALUES (@account, @owner, 0) \
                 ON CONFLICT (account_id) DO UPDATE SET owner = @owner, updated_at = NOW()",
            )
            .bind("owner", e.owner.as_str()),
            AccountEvent::Deposited(e) => SqlStatement::text(
                "UPDATE account_balances SET balance = balance + @amount, updated_at = NOW() \
                 WHERE account_id = @account",
            )
            .bind("amount", amount(e.amount)?),
            AccountEvent::Withdrawn(e) => SqlStatement::text(
                "UPDATE account_balances SET balance = balance - @amount, updated_at = NOW() \
                 WHERE account_id = @account",
            )
            .bind("amount", amount(e.amount)?),
            AccountEvent::Closed(_) => {
                SqlStatement::text("DELETE FROM account_balances WHERE account_id = @account")
            }
        };
        batch.push(statement.bind("account", account));
        Ok(())
    }
}

fn amount(value: u64) -> Result<i64, DomainError> {
    i64::try_from(value)
        .map_err(|_| DomainError::Validation(format!("amount {value} does not fit a BIGINT")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use eventweave_core::metadata::MetadataScope;
    use eventweave_sql::SqlParam;
    use uuid::Uuid;

    use crate::domain::events::{FundsDeposited, FundsWithdrawn};

    fn envelope(event: AccountEvent) -> EventEnvelope<AccountEvent> {
        EventEnvelope {
            event,
            event_id: Uuid::nil(),
            event_type: String::new(),
            stream: "account/ann".into(),
            stream_position: 0,
            log_position: 0,
            created: DateTime::UNIX_EPOCH,
            metadata: MetadataScope::new(),
        }
    }

    #[test]
    fn test_deposit_updates_balance_row() {
        // Arrange
        let mut batch = SqlBatch::new();
        let deposited = envelope(
            FundsDeposited {
                amount: 40,
                reference: None,
            }
            .into(),
        );

        // Act
        AccountBalances.project(&deposited, &mut batch).unwrap();

        // Assert
        let prepared = batch.prepare().unwrap();
        assert_eq!(prepared.len(), 1);
        assert!(prepared[0].sql.starts_with("UPDATE account_balances SET balance = balance + $1"));
        assert_eq!(
            prepared[0].params,
            vec![SqlParam::Int(Some(40)), SqlParam::Text(Some("account/ann".into()))]
        );
    }

    #[test]
    fn test_open_binds_owner_once_for_both_uses() {
        let mut batch = SqlBatch::new();
        let opened = envelope(crate::domain::events::AccountOpened { owner: "ann".into() }.into());

        AccountBalances.project(&opened, &mut batch).unwrap();

        let prepared = batch.prepare().unwrap();
        assert!(prepared[0].sql.contains("VALUES ($1, $2, 0)"));
        assert!(prepared[0].sql.contains("SET owner = $2"));
    }

    #[test]
    fn test_oversized_amount_is_rejected() {
        let mut batch = SqlBatch::new();

        let result =
            AccountBalances.project(&envelope(FundsWithdrawn { amount: u64::MAX }.into()), &mut batch);

        assert!(result.is_err());
        assert!(batch.is_empty());
    }
}
