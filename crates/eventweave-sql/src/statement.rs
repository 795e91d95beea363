//! Queued SQL statements with named parameters.
//!
//! Projections write statements with `@name` placeholders. Before execution
//! every statement is rewritten to `PostgreSQL`'s positional `$n` form; a name
//! used more than once maps to the same position.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SqlProjectionError;

/// How a statement's text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// A procedure name, called with the bound parameters in binding order.
    Procedure,
}

/// A bindable value. `None` binds a typed `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<Value>),
}

macro_rules! param_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for SqlParam {
            fn from(value: $ty) -> Self {
                Self::$variant(Some(value.into()))
            }
        }

        impl From<Option<$ty>> for SqlParam {
            fn from(value: Option<$ty>) -> Self {
                Self::$variant(value.map(Into::into))
            }
        }
    };
}

param_from!(Bool, bool);
param_from!(Int, i64);
param_from!(Int, i32);
param_from!(Int, u32);
param_from!(Float, f64);
param_from!(Text, String);
param_from!(Text, &str);
param_from!(Uuid, Uuid);
param_from!(Timestamp, DateTime<Utc>);
param_from!(Json, Value);

/// One queued statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    sql: String,
    params: Vec<(String, SqlParam)>,
    kind: StatementKind,
}

impl SqlStatement {
    /// A plain SQL statement.
    #[must_use]
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: StatementKind::Text,
        }
    }

    /// A call of the named procedure.
    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            sql: name.into(),
            params: Vec::new(),
            kind: StatementKind::Procedure,
        }
    }

    /// Binds `@name`. Binding a name again replaces its value.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlParam>) -> Self {
        let name = name.into();
        let name = name.strip_prefix('@').map(str::to_owned).unwrap_or(name);
        let value = value.into();
        match self.params.iter_mut().find(|(bound, _)| *bound == name) {
            Some((_, slot)) => *slot = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// The statement text as written.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The statement kind.
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Bound parameters, in binding order.
    #[must_use]
    pub fn params(&self) -> &[(String, SqlParam)] {
        &self.params
    }

    /// Rewrites the statement into positional form.
    ///
    /// # Errors
    ///
    /// Returns `SqlProjectionError::UnboundParameter` for a placeholder with
    /// no bound value and `SqlProjectionError::InvalidParameterName` for a
    /// procedure parameter that is not an identifier.
    pub fn prepare(&self) -> Result<PreparedStatement, SqlProjectionError> {
        match self.kind {
            StatementKind::Text => rewrite_named(&self.sql, &self.params),
            StatementKind::Procedure => {
                let mut call = format!("CALL {}(", self.sql);
                for (i, (name, _)) in self.params.iter().enumerate() {
                    if !is_identifier(name) {
                        return Err(SqlProjectionError::InvalidParameterName(name.clone()));
                    }
                    if i > 0 {
                        call.push_str(", ");
                    }
                    call.push('@');
                    call.push_str(name);
                }
                call.push(')');
                rewrite_named(&call, &self.params)
            }
        }
    }
}

/// A statement in positional form, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    /// SQL with `$n` placeholders.
    pub sql: String,
    /// Values for `$1..$n`.
    pub params: Vec<SqlParam>,
}

/// Statements produced for one projected event, executed in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlBatch {
    statements: Vec<SqlStatement>,
}

impl SqlBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a statement.
    pub fn push(&mut self, statement: SqlStatement) {
        self.statements.push(statement);
    }

    /// Number of queued statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The queued statements in order.
    pub fn iter(&self) -> impl Iterator<Item = &SqlStatement> {
        self.statements.iter()
    }

    /// Prepares every statement.
    ///
    /// # Errors
    ///
    /// See [`SqlStatement::prepare`].
    pub fn prepare(&self) -> Result<Vec<PreparedStatement>, SqlProjectionError> {
        self.statements.iter().map(SqlStatement::prepare).collect()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replaces `@name` placeholders with `$n`.
///
/// Placeholders inside single-quoted literals, double-quoted identifiers and
/// `--` comments are left alone.
///
/// # Errors
///
/// Returns `SqlProjectionError::UnboundParameter` if a placeholder has no
/// value in `params`.
pub fn rewrite_named(
    sql: &str,
    params: &[(String, SqlParam)],
) -> Result<PreparedStatement, SqlProjectionError> {
    let mut out = String::with_capacity(sql.len());
    let mut order: Vec<&str> = Vec::new();
    let mut values = Vec::new();
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                let end = sql[i + 1..]
                    .find(char::from(quote))
                    .map_or(sql.len(), |offset| i + 1 + offset + 1);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(sql.len(), |offset| i + offset);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'@' if bytes
                .get(i + 1)
                .is_some_and(|&b| b.is_ascii_alphabetic() || b == b'_') =>
            {
                let start = i + 1;
                let end = sql[start..]
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .map_or(sql.len(), |offset| start + offset);
                let name = &sql[start..end];
                let position = if let Some(position) = order.iter().position(|known| *known == name) {
                    position
                } else {
                    let (_, value) = params
                        .iter()
                        .find(|(bound, _)| bound == name)
                        .ok_or_else(|| SqlProjectionError::UnboundParameter {
                            name: name.to_owned(),
                            sql: sql.to_owned(),
                        })?;
                    order.push(name);
                    values.push(value.clone());
                    order.len() - 1
                };
                out.push('$');
                out.push_str(&(position + 1).to_string());
                i = end;
            }
            _ => {
                let next = sql[i..]
                    .char_indices()
                    .nth(1)
                    .map_or(sql.len(), |(offset, _)| i + offset);
                out.push_str(&sql[i..next]);
                i = next;
            }
        }
    }

    Ok(PreparedStatement {
        sql: out,
        params: values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_parameters_become_positional() {
        // Arrange
        let statement = SqlStatement::text(
            "INSERT INTO balances (account, amount) VALUES (@account, @amount)",
        )
        .bind("amount", 40_i64)
        .bind("account", "acc-1");

        // Act
        let prepared = statement.prepare().unwrap();

        // Assert
        assert_eq!(
            prepared.sql,
            "INSERT INTO balances (account, amount) VALUES ($1, $2)"
        );
        assert_eq!(
            prepared.params,
            vec![SqlParam::Text(Some("acc-1".into())), SqlParam::Int(Some(40))]
        );
    }

    #[test]
    fn test_repeated_name_reuses_position() {
        let statement = SqlStatement::text(
            "UPDATE balances SET amount = amount + @delta, last = @delta WHERE account = @account",
        )
        .bind("account", "acc-1")
        .bind("delta", 5_i64);

        let prepared = statement.prepare().unwrap();

        assert_eq!(
            prepared.sql,
            "UPDATE balances SET amount = amount + $1, last = $1 WHERE account = $2"
        );
        assert_eq!(prepared.params.len(), 2);
    }

    #[test]
    fn test_literals_and_comments_are_untouched() {
        let statement = SqlStatement::text(
            "SELECT '@literal', \"@ident\" -- @comment\nFROM t WHERE a = @a",
        )
        .bind("a", 1_i64);

        let prepared = statement.prepare().unwrap();

        assert_eq!(
            prepared.sql,
            "SELECT '@literal', \"@ident\" -- @comment\nFROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_unbound_parameter_is_rejected() {
        let statement = SqlStatement::text("DELETE FROM t WHERE id = @id");

        let err = statement.prepare().unwrap_err();

        assert!(matches!(err, SqlProjectionError::UnboundParameter { name, .. } if name == "id"));
    }

    #[test]
    fn test_casts_and_operators_survive() {
        let statement =
            SqlStatement::text("SELECT @doc::jsonb @> '{}'::jsonb").bind("doc", serde_json::json!({}));

        let prepared = statement.prepare().unwrap();

        assert_eq!(prepared.sql, "SELECT $1::jsonb @> '{}'::jsonb");
    }

    #[test]
    fn test_procedure_calls_with_binding_order() {
        let statement = SqlStatement::procedure("apply_deposit")
            .bind("@account", "acc-1")
            .bind("amount", 10_i64);

        let prepared = statement.prepare().unwrap();

        assert_eq!(prepared.sql, "CALL apply_deposit($1, $2)");
        assert_eq!(prepared.params[1], SqlParam::Int(Some(10)));
    }

    #[test]
    fn test_rebinding_replaces_value() {
        let statement = SqlStatement::text("SELECT @a").bind("a", 1_i64).bind("a", 2_i64);

        assert_eq!(statement.params().len(), 1);
        assert_eq!(statement.prepare().unwrap().params, vec![SqlParam::Int(Some(2))]);
    }

    #[test]
    fn test_null_binds_typed_none() {
        let statement = SqlStatement::text("SELECT @note").bind("note", None::<String>);

        assert_eq!(statement.prepare().unwrap().params, vec![SqlParam::Text(None)]);
    }

    #[test]
    fn test_batch_prepares_in_order() {
        let mut batch = SqlBatch::new();
        batch.push(SqlStatement::text("SELECT @x").bind("x", 1_i64));
        batch.push(SqlStatement::text("SELECT 2"));

        let prepared = batch.prepare().unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(prepared[0].sql, "SELECT $1");
        assert_eq!(prepared[1].sql, "SELECT 2");
    }
}
