use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a tag definition.
    TagId
);
uuid_newtype!(UserId);
uuid_newtype!(OrganizationId);

/// An organization-scoped node of the tag forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub organization_id: OrganizationId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tag_id: Option<TagId>,
}

impl Tag {
    pub fn root(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        Self {
            id: TagId::new_v4(),
            organization_id,
            name: name.into(),
            parent_tag_id: None,
        }
    }

    /// Builds a new tag nested directly under `parent`, in the parent's organization.
    pub fn child_of(parent: &Tag, name: impl Into<String>) -> Self {
        Self {
            id: TagId::new_v4(),
            organization_id: parent.organization_id,
            name: name.into(),
            parent_tag_id: Some(parent.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagAssignment {
    pub user_id: UserId,
    pub tag_id: TagId,
    pub organization_id: OrganizationId,
}

impl TagAssignment {
    pub fn new(user_id: UserId, tag: &Tag) -> Self {
        Self {
            user_id,
            tag_id: tag.id,
            organization_id: tag.organization_id,
        }
    }

    pub fn key(&self) -> AssignmentKey {
        AssignmentKey {
            user_id: self.user_id,
            tag_id: self.tag_id,
        }
    }
}

/// Identity of an assignment row; `(user_id, tag_id)` is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentKey {
    pub user_id: UserId,
    pub tag_id: TagId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPeopleToTagPayload {
    pub tag_id: TagId,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTagsPayload {
    pub current_tag_id: TagId,
    pub selected_tag_ids: Vec<TagId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsAssignedToUserQuery {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClosureViolation {
    UnknownTag {
        user_id: UserId,
        tag_id: TagId,
    },
    OrganizationMismatch {
        user_id: UserId,
        tag_id: TagId,
        assignment_organization_id: OrganizationId,
        tag_organization_id: OrganizationId,
    },
    MissingAncestor {
        user_id: UserId,
        tag_id: TagId,
        missing_parent_id: TagId,
    },
}

impl ClosureViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            ClosureViolation::UnknownTag { .. } => "tag_closure_unknown_tag",
            ClosureViolation::OrganizationMismatch { .. } => "tag_closure_organization_mismatch",
            ClosureViolation::MissingAncestor { .. } => "tag_closure_missing_ancestor",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            ClosureViolation::UnknownTag { .. } => "Assignment references a tag that does not exist",
            ClosureViolation::OrganizationMismatch { .. } => {
                "Assignment organization does not match its tag's organization"
            }
            ClosureViolation::MissingAncestor { .. } => {
                "User holds a tag without holding its parent tag"
            }
        }
    }
}

/// Collapses repeated ids, keeping the first occurrence of each.
pub(crate) fn dedup_preserving_order<T: Copy + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
