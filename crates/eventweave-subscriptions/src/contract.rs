//! Subscription contracts and event type filters.

use std::fmt;

use eventweave_core::event::EventContract;

use crate::error::SubscriptionError;

/// Declared identity of a subscription.
///
/// The fully qualified name `[namespace.]name@v{version}` is the group name
/// of the persistent subscription. Bumping the version creates a new
/// subscription that can continue where its predecessor stopped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionContract {
    /// Contract name.
    pub name: String,
    /// Contract version, starting at 1.
    pub version: u32,
    /// Optional dotted namespace.
    pub namespace: Option<String>,
    /// Explicit predecessor group name.
    pub predecessor: Option<String>,
    /// Start a brand-new subscription at the end of the log instead of the beginning.
    pub start_from_end: bool,
}

impl SubscriptionContract {
    /// Declares a contract without namespace.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            namespace: None,
            predecessor: None,
            start_from_end: false,
        }
    }

    /// Places the contract in a namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Names the subscription this one succeeds.
    #[must_use]
    pub fn succeeding(mut self, predecessor: impl Into<String>) -> Self {
        self.predecessor = Some(predecessor.into());
        self
    }

    /// Starts a new subscription at the end of the log.
    #[must_use]
    pub fn from_end(mut self) -> Self {
        self.start_from_end = true;
        self
    }

    /// The group name: `[namespace.]name@v{version}`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.name_at(self.version)
    }

    /// The predecessor group name.
    ///
    /// An explicit predecessor wins; otherwise a contract above version 1
    /// succeeds the same contract one version down.
    #[must_use]
    pub fn predecessor_name(&self) -> Option<String> {
        match &self.predecessor {
            Some(predecessor) => Some(predecessor.clone()),
            None if self.version > 1 => Some(self.name_at(self.version - 1)),
            None => None,
        }
    }

    fn name_at(&self, version: u32) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}@v{version}", self.name),
            None => format!("{}@v{version}", self.name),
        }
    }
}

impl fmt::Display for SubscriptionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Builds the anchored alternation of every contract's wire name.
///
/// Duplicates are dropped, order is kept, and every name is escaped so that
/// dots match literally.
///
/// # Errors
///
/// Returns `SubscriptionError::NoContracts` if `contracts` is empty; an
/// empty alternation would match nothing.
pub fn build_filter<I>(group: &str, contracts: I) -> Result<String, SubscriptionError>
where
    I: IntoIterator<Item = EventContract>,
{
    let mut names: Vec<String> = Vec::new();
    for contract in contracts {
        let name = contract.wire_name();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    if names.is_empty() {
        return Err(SubscriptionError::NoContracts(group.to_owned()));
    }

    let alternation = names
        .iter()
        .map(String::as_str)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Ok(format!("^(?:{alternation})$"))
}
