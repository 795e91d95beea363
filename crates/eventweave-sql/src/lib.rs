//! Eventweave SQL — projections backed by `PostgreSQL`.
//!
//! A [`SqlProjector`] queues statements with `@name` parameters for each
//! event; [`PgSqlExecutor`] rewrites them to positional form and runs the
//! batch in a single transaction, rolling back everything on failure.

pub mod error;
pub mod executor;
pub mod projection;
pub mod schema;
pub mod statement;

pub use error::SqlProjectionError;
pub use executor::{PgSqlExecutor, SqlExecutor, StepOutcome};
pub use projection::{SqlProjection, SqlProjector};
pub use statement::{PreparedStatement, SqlBatch, SqlParam, SqlStatement, StatementKind};
