//! Projection database schema.

/// SQL to create the table recording which events each projection applied.
///
/// A row is inserted in the same transaction as the projection's
/// statements, so a redelivered event is applied at most once.
pub const CREATE_PROJECTION_STEPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS eventweave_projection_steps (
    group_name  VARCHAR(255) NOT NULL,
    event_id    UUID NOT NULL,
    applied_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (group_name, event_id)
);
";

pub(crate) const INSERT_PROJECTION_STEP: &str = r"
INSERT INTO eventweave_projection_steps (group_name, event_id)
VALUES ($1, $2)
ON CONFLICT (group_name, event_id) DO NOTHING
";
