//! Eventweave demo process entry point.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use eventweave_commands::CommandBus;
use eventweave_core::error::DomainError;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::metadata::MetadataScope;
use eventweave_core::serializer::{JsonSerializer, Serializer};
use eventweave_core::store::SubscriptionStore;
use eventweave_demo::application::policies::{LargeWithdrawalAlert, WelcomeBonus};
use eventweave_demo::application::projections::{AccountBalances, balances};
use eventweave_demo::config::AppConfig;
use eventweave_demo::domain::aggregates::Account;
use eventweave_demo::domain::commands::{Deposit, OpenAccount, Withdraw};
use eventweave_demo::error::AppError;
use eventweave_sql::{PgSqlExecutor, SqlProjection};
use eventweave_store::MemoryEventStore;
use eventweave_subscriptions::{PolicyRunner, Reactor, SubscriptionWorker, WorkerHandle};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Eventweave bank account demo");

    let config = AppConfig::from_env()?;
    tracing::info!(
        routing = %config.routing,
        max_attempts = config.commit.max_attempts,
        backoff_ms = u64::try_from(config.commit.backoff.as_millis()).unwrap_or(u64::MAX),
        sql_projection = config.database_url.is_some(),
        "configuration loaded"
    );

    let store = Arc::new(MemoryEventStore::new());
    let subscriptions: Arc<dyn SubscriptionStore> = store.clone();
    let serializer: Arc<dyn Serializer> = Arc::new(JsonSerializer);
    let bus = CommandBus::new(
        store.clone(),
        Arc::clone(&serializer),
        config.routing,
        config.commit,
    );

    let mut workers: Vec<WorkerHandle> = vec![
        SubscriptionWorker::new(balances(), Arc::clone(&subscriptions), Arc::clone(&serializer))
            .spawn(),
        SubscriptionWorker::new(
            PolicyRunner::new(WelcomeBonus { amount: 25 }, bus.clone()),
            Arc::clone(&subscriptions),
            Arc::clone(&serializer),
        )
        .spawn(),
        SubscriptionWorker::new(
            Reactor::new(LargeWithdrawalAlert::new(1_000), bus.clone()),
            Arc::clone(&subscriptions),
            Arc::clone(&serializer),
        )
        .spawn(),
    ];

    if let Some(database_url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let executor = PgSqlExecutor::new(pool);
        executor.ensure_schema().await?;
        workers.push(
            SubscriptionWorker::new(
                SqlProjection::new(AccountBalances, executor),
                Arc::clone(&subscriptions),
                Arc::clone(&serializer),
            )
            .spawn(),
        );
    }

    run_scenario(&bus).await?;

    tracing::info!(workers = workers.len(), "Running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for worker in workers {
        let group = worker.group().to_owned();
        if let Err(err) = worker.stop().await {
            tracing::error!(group = %group, error = %err, "worker ended with an error");
        }
    }

    tracing::info!(events = store.len(), "Stopped");
    Ok(())
}

/// Drives a few accounts so the workers have something to consume.
async fn run_scenario(bus: &CommandBus) -> Result<(), AppError> {
    let metadata = MetadataScope::new();
    let ann = AggregateIdentifier::new("account/ann");
    let bob = AggregateIdentifier::new("account/bob");

    bus.execute::<Account, _>(&ann, &OpenAccount { owner: "ann".into() }, &metadata)
        .await?;
    bus.execute::<Account, _>(&bob, &OpenAccount { owner: "bob".into() }, &metadata)
        .await?;
    bus.execute::<Account, _>(
        &ann,
        &Deposit {
            amount: 5_000,
            reference: Some("salary".into()),
        },
        &metadata,
    )
    .await?;
    bus.execute::<Account, _>(&ann, &Withdraw { amount: 1_200 }, &metadata)
        .await?;

    match bus
        .execute::<Account, _>(&bob, &Withdraw { amount: 10_000 }, &metadata)
        .await
    {
        Err(DomainError::Validation(reason)) => {
            tracing::info!(account = %bob, reason = %reason, "withdrawal rejected as expected");
        }
        Ok(outcome) => tracing::warn!(account = %bob, ?outcome, "overdraft was accepted"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
