//! Resource record, state, and query filter types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an owned resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// In normal use.
    Active,
    /// Hidden from default views but restorable.
    Archived,
    /// Soft-deleted. Terminal: never accessible again.
    Deleted,
}

impl ResourceState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 3] = [Self::Active, Self::Archived, Self::Deleted];

    /// Returns `true` for states a resource can never leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Minimal projection of a resource returned by the ownership store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct ResourceRecord {
    /// Resource identifier.
    #[builder(into)]
    pub id: String,
    /// Identifier of the owning subject.
    #[builder(into)]
    pub owner_id: String,
    /// Current lifecycle state.
    #[builder(default = ResourceState::Active)]
    pub state: ResourceState,
}

impl ResourceRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, state: ResourceState) -> Self {
        Self { id: id.into(), owner_id: owner_id.into(), state }
    }
}

/// How a [`StateConstraint`] matches states, for stores translating it into a query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateMatch<'a> {
    /// The state must be one of these.
    AnyOf(&'a [ResourceState]),
    /// The state must be none of these.
    NoneOf(&'a [ResourceState]),
}

/// Constraint on a resource's state in an ownership query.
///
/// Only constructible through [`accessible`](Self::accessible) and
/// [`not_terminal`](Self::not_terminal); neither ever admits
/// [`ResourceState::Deleted`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateConstraint {
    inclusive: bool,
    states: Vec<ResourceState>,
}

impl StateConstraint {
    /// States an owner may access: `Active`, plus `Archived` when allowed.
    #[must_use]
    pub fn accessible(allow_archived: bool) -> Self {
        let mut states = vec![ResourceState::Active];
        if allow_archived {
            states.push(ResourceState::Archived);
        }
        Self { inclusive: true, states }
    }

    /// Every state except terminal ones; used to decide whether a resource exists.
    #[must_use]
    pub fn not_terminal() -> Self {
        let terminal = ResourceState::ALL.into_iter().filter(|state| state.is_terminal()).collect();
        Self { inclusive: false, states: terminal }
    }

    /// Returns whether `state` satisfies the constraint.
    #[must_use]
    pub fn admits(&self, state: ResourceState) -> bool {
        self.states.contains(&state) == self.inclusive
    }

    /// Returns the constraint in a form a query builder can translate.
    #[must_use]
    pub fn as_match(&self) -> StateMatch<'_> {
        if self.inclusive {
            StateMatch::AnyOf(&self.states)
        } else {
            StateMatch::NoneOf(&self.states)
        }
    }
}

/// Filter passed to [`OwnershipRecordStore::find_one`](super::OwnershipRecordStore::find_one).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipFilter {
    /// Resource to look up.
    pub resource_id: String,
    /// Required owner, or `None` to ignore ownership.
    pub owner_id: Option<String>,
    /// Required lifecycle state.
    pub state: StateConstraint,
}

impl OwnershipFilter {
    /// Matches `resource_id` owned by `owner_id` in an admitted state.
    #[must_use]
    pub fn owned_by(
        resource_id: impl Into<String>,
        owner_id: impl Into<String>,
        state: StateConstraint,
    ) -> Self {
        Self { resource_id: resource_id.into(), owner_id: Some(owner_id.into()), state }
    }

    /// Matches `resource_id` in any non-terminal state, regardless of owner.
    #[must_use]
    pub fn existing(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            owner_id: None,
            state: StateConstraint::not_terminal(),
        }
    }

    /// Returns whether `record` satisfies the filter.
    #[must_use]
    pub fn matches(&self, record: &ResourceRecord) -> bool {
        record.id == self.resource_id
            && self.owner_id.as_deref().is_none_or(|owner| owner == record.owner_id)
            && self.state.admits(record.state)
    }
}
