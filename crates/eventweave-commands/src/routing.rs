//! Creation-versus-modification routing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use eventweave_core::aggregate::Root;
use eventweave_core::command::{Command, CommandKind};
use eventweave_core::error::DomainError;
use eventweave_core::identifier::AggregateIdentifier;
use eventweave_core::repository::Repository;
use eventweave_core::state::State;
use eventweave_core::unit_of_work::UnitOfWork;

/// How the router decides between loading and creating an aggregate.
///
/// Selected once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// Load the aggregate if its stream exists, otherwise create it.
    #[default]
    Automatic,
    /// [`CommandKind::Create`] commands always create and
    /// [`CommandKind::Modify`] commands require an existing aggregate.
    MarkerInterface,
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => f.write_str("automatic"),
            Self::MarkerInterface => f.write_str("marker"),
        }
    }
}

/// An unrecognised routing policy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown routing policy {0:?}, expected \"automatic\" or \"marker\"")]
pub struct ParseRoutingPolicyError(String);

impl FromStr for RoutingPolicy {
    type Err = ParseRoutingPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "automatic" | "auto" => Ok(Self::Automatic),
            "marker" | "marker_interface" | "marker-interface" => Ok(Self::MarkerInterface),
            _ => Err(ParseRoutingPolicyError(s.to_owned())),
        }
    }
}

/// Innermost layer: resolves the target root and lets it accept the command.
pub struct Router<S: State> {
    repository: Repository<S>,
    policy: RoutingPolicy,
}

impl<S: State> fmt::Debug for Router<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("repository", &self.repository)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S: State> Router<S> {
    /// Creates a router.
    #[must_use]
    pub fn new(repository: Repository<S>, policy: RoutingPolicy) -> Self {
        Self { repository, policy }
    }

    /// The policy in use.
    #[must_use]
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Routes `command` to the root named `id` inside `uow`.
    ///
    /// Under the marker policy a creation command never reads the stream;
    /// if the aggregate already exists the append's expected-version check
    /// rejects the write.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for a modification of a
    /// missing aggregate under the marker policy, load failures from the
    /// repository, and the command's own rejection.
    pub async fn route<C>(
        &self,
        uow: &mut UnitOfWork,
        id: &AggregateIdentifier,
        command: &C,
    ) -> Result<(), DomainError>
    where
        C: Command<S>,
    {
        let root = match (self.policy, C::KIND) {
            (RoutingPolicy::Automatic, _) => self.repository.try_get_or_add(uow, id).await?,
            (RoutingPolicy::MarkerInterface, CommandKind::Create) => {
                if id.is_system_stream() {
                    return Err(DomainError::SystemStream(id.clone()));
                }
                self.repository.add(uow, id, Root::new())?
            }
            (RoutingPolicy::MarkerInterface, CommandKind::Modify) => {
                self.repository.get_root(uow, id).await?
            }
        };
        debug!(
            aggregate = %id,
            command = command.command_type(),
            version = %root.version(),
            "routing command"
        );
        root.accept(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_routing_policy_names() {
        assert_eq!("automatic".parse(), Ok(RoutingPolicy::Automatic));
        assert_eq!(" Marker ".parse(), Ok(RoutingPolicy::MarkerInterface));
        assert_eq!("marker-interface".parse(), Ok(RoutingPolicy::MarkerInterface));
    }

    #[test]
    fn test_parse_unknown_routing_policy_fails() {
        let err = "sometimes".parse::<RoutingPolicy>().unwrap_err();
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for policy in [RoutingPolicy::Automatic, RoutingPolicy::MarkerInterface] {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }

    #[test]
    fn test_default_policy_is_automatic() {
        assert_eq!(RoutingPolicy::default(), RoutingPolicy::Automatic);
    }
}
