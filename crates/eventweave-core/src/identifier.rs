//! Stream identifiers and versions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Streams whose name starts with this character belong to the store itself.
pub const SYSTEM_STREAM_PREFIX: char = '$';

/// Opaque name of an aggregate stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateIdentifier(String);

impl AggregateIdentifier {
    /// Creates a new identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this names a reserved system stream.
    #[must_use]
    pub fn is_system_stream(&self) -> bool {
        self.0.starts_with(SYSTEM_STREAM_PREFIX)
    }
}

impl fmt::Display for AggregateIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AggregateIdentifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AggregateIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for AggregateIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Position of the last event folded into an aggregate.
///
/// [`AggregateVersion::NONE`] means the stream has no history. Any other value
/// is the stream position of the last event, i.e. `stream length - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateVersion(i64);

impl AggregateVersion {
    /// Sentinel for an aggregate without prior history.
    pub const NONE: Self = Self(-1);

    /// Creates a version; every negative input collapses to [`AggregateVersion::NONE`].
    #[must_use]
    pub const fn new(value: i64) -> Self {
        if value < 0 { Self::NONE } else { Self(value) }
    }

    /// Version of a stream that holds `length` events.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn from_stream_length(length: usize) -> Self {
        Self::new(length as i64 - 1)
    }

    /// Returns the raw value (`-1` for [`AggregateVersion::NONE`]).
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns `true` for the no-history sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }

    /// Version after `count` further events have been written.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn advance(self, count: usize) -> Self {
        Self::new(self.0 + count as i64)
    }

    /// The expected-version condition for appending on top of this version.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn expected(self) -> ExpectedVersion {
        if self.is_none() {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(self.0 as u64)
        }
    }
}

impl Default for AggregateVersion {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for AggregateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Optimistic concurrency condition attached to an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The last event of the stream must sit at this position.
    Exact(u64),
    /// No check.
    Any,
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(position) => write!(f, "{position}"),
            Self::Any => f.write_str("any"),
        }
    }
}
