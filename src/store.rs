//! Storage seams consumed by the propagation engine.
//!
//! The engine only reads through these traits and writes through exactly one
//! `bulk_*` call per operation. Implementations must apply each bulk call
//! atomically; nothing else about transactions is assumed.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AssignmentKey, OrganizationId, Tag, TagAssignment, TagId, UserId};

#[async_trait]
pub trait TagStore: Send + Sync {
    async fn get_tag(&self, tag_id: TagId) -> Result<Option<Tag>>;

    /// Resolves the given ids; unresolved ids are omitted from the result.
    async fn get_tags(&self, tag_ids: &[TagId]) -> Result<Vec<Tag>>;

    /// One BFS level: every tag whose parent is in `parent_ids`.
    async fn get_tags_by_parent(&self, parent_ids: &HashSet<TagId>) -> Result<Vec<Tag>>;

    async fn get_assignments_by_tag(&self, tag_id: TagId) -> Result<Vec<TagAssignment>>;

    async fn get_assignments_by_user(&self, user_id: UserId) -> Result<Vec<TagAssignment>>;

    /// Existing rows among `user_ids × tag_ids`.
    async fn get_assignments(
        &self,
        user_ids: &[UserId],
        tag_ids: &[TagId],
    ) -> Result<Vec<TagAssignment>>;

    /// Inserts the entries that do not exist yet; existing rows are left
    /// untouched. Returns the number of rows inserted.
    async fn bulk_upsert_assignments(&self, entries: &[TagAssignment]) -> Result<u64>;

    /// Deletes the entries that exist. Returns the number of rows deleted.
    async fn bulk_delete_assignments(&self, entries: &[AssignmentKey]) -> Result<u64>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The subset of `user_ids` that resolve to existing users.
    async fn existing_users(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>>;

    /// The subset of `user_ids` that are members of `organization_id`.
    async fn organization_members(
        &self,
        organization_id: OrganizationId,
        user_ids: &[UserId],
    ) -> Result<HashSet<UserId>>;
}
