//! Per-execution registry of attached aggregates.

use std::collections::HashMap;

use crate::aggregate::{Aggregate, AttachedRoot, Root};
use crate::error::DomainError;
use crate::identifier::AggregateIdentifier;
use crate::state::State;

/// Aggregates attached while handling one command.
///
/// A unit of work lives for a single command execution and is never shared
/// between concurrent executions.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    aggregates: HashMap<AggregateIdentifier, Box<dyn AttachedRoot>>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a root.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateAttach` if the identifier is already attached.
    pub fn attach<S: State>(&mut self, id: AggregateIdentifier, root: Root<S>) -> Result<(), DomainError> {
        if self.aggregates.contains_key(&id) {
            return Err(DomainError::DuplicateAttach(id));
        }
        self.aggregates.insert(id, Box::new(root));
        Ok(())
    }

    /// Returns `true` if the identifier is attached.
    #[must_use]
    pub fn contains(&self, id: &AggregateIdentifier) -> bool {
        self.aggregates.contains_key(id)
    }

    /// Typed access to an attached root.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if nothing is attached under
    /// the identifier and `DomainError::RootTypeMismatch` if it was attached
    /// with another state type.
    pub fn get_mut<S: State>(&mut self, id: &AggregateIdentifier) -> Result<&mut Root<S>, DomainError> {
        let root = self
            .aggregates
            .get_mut(id)
            .ok_or_else(|| DomainError::AggregateNotFound(id.clone()))?;
        root.as_any_mut()
            .downcast_mut::<Root<S>>()
            .ok_or_else(|| DomainError::RootTypeMismatch(id.clone()))
    }

    /// Typed read access to an attached root.
    ///
    /// # Errors
    ///
    /// Same as [`UnitOfWork::get_mut`].
    pub fn get<S: State>(&self, id: &AggregateIdentifier) -> Result<&Root<S>, DomainError> {
        let root = self
            .aggregates
            .get(id)
            .ok_or_else(|| DomainError::AggregateNotFound(id.clone()))?;
        root.as_any()
            .downcast_ref::<Root<S>>()
            .ok_or_else(|| DomainError::RootTypeMismatch(id.clone()))
    }

    /// The single attached aggregate with pending changes, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MultipleChangedAggregates` if more than one
    /// aggregate changed; writing several aggregates from one command is not
    /// supported.
    pub fn changed(&self) -> Result<Option<Aggregate<'_>>, DomainError> {
        let mut changed = self
            .aggregates
            .iter()
            .filter(|(_, root)| root.has_changes())
            .map(|(id, root)| Aggregate {
                id,
                root: root.as_ref(),
            });

        let first = changed.next();
        if first.is_some() {
            let rest: Vec<Aggregate<'_>> = changed.collect();
            if !rest.is_empty() {
                let mut ids: Vec<AggregateIdentifier> = first
                    .into_iter()
                    .chain(rest)
                    .map(|aggregate| aggregate.id.clone())
                    .collect();
                ids.sort();
                return Err(DomainError::MultipleChangedAggregates(ids));
            }
        }
        Ok(first)
    }

    /// Marks the pending changes of one aggregate as persisted.
    pub fn mark_committed(&mut self, id: &AggregateIdentifier) {
        if let Some(root) = self.aggregates.get_mut(id) {
            root.mark_committed();
        }
    }

    /// Number of attached aggregates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    /// Returns `true` if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Detaches everything.
    pub fn clear(&mut self) {
        self.aggregates.clear();
    }
}
