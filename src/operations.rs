use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::hierarchy::{resolve_ancestors, resolve_descendants};
use crate::models::{
    AddPeopleToTagPayload, AssignmentKey, OrganizationId, SelectedTagsPayload, Tag, TagAssignment,
    TagId, TagsAssignedToUserQuery, UserId, dedup_preserving_order,
};
use crate::store::{TagStore, UserDirectory};

/// High-level tag assignment actions, decodable from a transport payload.
///
/// Callers must have verified that the acting user administers the
/// organization of every referenced tag; no authorization happens here.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TagOperation {
    AddPeopleToTag { payload: AddPeopleToTagPayload },
    AssignSelectedTagsToHolders { payload: SelectedTagsPayload },
    RemoveSelectedTagsFromHolders { payload: SelectedTagsPayload },
    TagsAssignedToUser { query: TagsAssignedToUserQuery },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TagOperationResult {
    Tag { tag: Tag },
    Tags { tags: Vec<Tag> },
}

/// Keeps user tag assignments closed under the tag hierarchy.
///
/// Every mutating operation validates all referenced entities first, then
/// computes its write set from the hierarchy and hands it to the store in one
/// bulk call. A failed validation never reaches the store's write path.
pub struct TagOperations<S: ?Sized, U: ?Sized = S> {
    store: Arc<S>,
    users: Arc<U>,
}

impl<S: ?Sized, U: ?Sized> Clone for TagOperations<S, U> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            users: Arc::clone(&self.users),
        }
    }
}

impl<S> TagOperations<S, S>
where
    S: TagStore + UserDirectory + ?Sized,
{
    /// Uses one backend for both tags and users.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            users: Arc::clone(&store),
            store,
        }
    }
}

impl<S, U> TagOperations<S, U>
where
    S: TagStore + ?Sized,
    U: UserDirectory + ?Sized,
{
    pub fn with_directory(store: Arc<S>, users: Arc<U>) -> Self {
        Self { store, users }
    }

    pub async fn execute(&self, operation: TagOperation) -> Result<TagOperationResult> {
        match operation {
            TagOperation::AddPeopleToTag { payload } => {
                let tag = self
                    .add_people_to_tag(payload.tag_id, &payload.user_ids)
                    .await?;
                Ok(TagOperationResult::Tag { tag })
            }
            TagOperation::AssignSelectedTagsToHolders { payload } => {
                let tag = self
                    .assign_selected_tags_to_holders(
                        payload.current_tag_id,
                        &payload.selected_tag_ids,
                    )
                    .await?;
                Ok(TagOperationResult::Tag { tag })
            }
            TagOperation::RemoveSelectedTagsFromHolders { payload } => {
                let tag = self
                    .remove_selected_tags_from_holders(
                        payload.current_tag_id,
                        &payload.selected_tag_ids,
                    )
                    .await?;
                Ok(TagOperationResult::Tag { tag })
            }
            TagOperation::TagsAssignedToUser { query } => {
                let tags = self
                    .tags_assigned_to_user(query.user_id, query.organization_id)
                    .await?;
                Ok(TagOperationResult::Tags { tags })
            }
        }
    }

    /// Assigns `tag_id` and all of its ancestors to each candidate that does
    /// not already hold it.
    pub async fn add_people_to_tag(&self, tag_id: TagId, user_ids: &[UserId]) -> Result<Tag> {
        let tag = self.load_tag(tag_id).await?;
        let candidates = dedup_preserving_order(user_ids);
        self.ensure_candidates(&tag, &candidates).await?;

        let already_holding: HashSet<UserId> = self
            .store
            .get_assignments(&candidates, &[tag.id])
            .await?
            .into_iter()
            .map(|assignment| assignment.user_id)
            .collect();
        let remaining = candidates
            .into_iter()
            .filter(|user_id| !already_holding.contains(user_id))
            .collect::<Vec<_>>();

        if remaining.is_empty() {
            tracing::debug!(tag_id = %tag.id, "every candidate already holds tag");
            return Ok(tag);
        }

        let ancestors = resolve_ancestors(&*self.store, &tag).await?;
        let entries = assignment_grid(&remaining, &ancestors);
        let inserted = self.store.bulk_upsert_assignments(&entries).await?;
        tracing::info!(
            tag_id = %tag.id,
            users = remaining.len(),
            tags = ancestors.len(),
            inserted,
            "added people to tag"
        );

        Ok(tag)
    }

    /// Grants each selected tag, with its ancestors, to every holder of
    /// `current_tag_id`.
    pub async fn assign_selected_tags_to_holders(
        &self,
        current_tag_id: TagId,
        selected_tag_ids: &[TagId],
    ) -> Result<Tag> {
        let current = self.load_tag(current_tag_id).await?;
        let selected = self
            .load_selected_tags(current.organization_id, selected_tag_ids)
            .await?;
        let holders = self.holders_of(current.id).await?;

        let mut seen = HashSet::new();
        let mut tags_to_assign = Vec::new();
        for tag in &selected {
            for ancestor in resolve_ancestors(&*self.store, tag).await? {
                if seen.insert(ancestor.id) {
                    tags_to_assign.push(ancestor);
                }
            }
        }

        let entries = assignment_grid(&holders, &tags_to_assign);
        if entries.is_empty() {
            tracing::debug!(tag_id = %current.id, "no holders to assign selected tags to");
            return Ok(current);
        }

        let inserted = self.store.bulk_upsert_assignments(&entries).await?;
        tracing::info!(
            tag_id = %current.id,
            users = holders.len(),
            tags = tags_to_assign.len(),
            inserted,
            "assigned selected tags to holders"
        );

        Ok(current)
    }

    /// Revokes each selected tag, with all of its descendants, from every
    /// holder of `current_tag_id`.
    pub async fn remove_selected_tags_from_holders(
        &self,
        current_tag_id: TagId,
        selected_tag_ids: &[TagId],
    ) -> Result<Tag> {
        let current = self.load_tag(current_tag_id).await?;
        let selected = self
            .load_selected_tags(current.organization_id, selected_tag_ids)
            .await?;
        let holders = self.holders_of(current.id).await?;

        let descendants = resolve_descendants(&*self.store, &selected).await?;
        let keys = holders
            .iter()
            .flat_map(|user_id| {
                descendants.iter().map(move |tag| AssignmentKey {
                    user_id: *user_id,
                    tag_id: tag.id,
                })
            })
            .collect::<Vec<_>>();
        if keys.is_empty() {
            tracing::debug!(tag_id = %current.id, "no holders to remove selected tags from");
            return Ok(current);
        }

        let deleted = self.store.bulk_delete_assignments(&keys).await?;
        tracing::info!(
            tag_id = %current.id,
            users = holders.len(),
            tags = descendants.len(),
            deleted,
            "removed selected tags from holders"
        );

        Ok(current)
    }

    /// Tags held by `user_id`, sorted by name. An unknown user holds nothing.
    pub async fn tags_assigned_to_user(
        &self,
        user_id: UserId,
        organization_id: Option<OrganizationId>,
    ) -> Result<Vec<Tag>> {
        let tag_ids = self
            .store
            .get_assignments_by_user(user_id)
            .await?
            .into_iter()
            .filter(|assignment| organization_id.is_none_or(|org| assignment.organization_id == org))
            .map(|assignment| assignment.tag_id)
            .collect::<Vec<_>>();
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tags = self.store.get_tags(&tag_ids).await?;
        tags.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tags)
    }

    async fn load_tag(&self, tag_id: TagId) -> Result<Tag> {
        self.store
            .get_tag(tag_id)
            .await?
            .ok_or_else(|| LibError::tag_not_found(anyhow!("tag {} not found", tag_id)))
    }

    /// Resolves every selected id inside `organization_id`; any id that does
    /// not resolve there fails the whole call.
    async fn load_selected_tags(
        &self,
        organization_id: OrganizationId,
        selected_tag_ids: &[TagId],
    ) -> Result<Vec<Tag>> {
        let requested = dedup_preserving_order(selected_tag_ids);
        let resolved = self
            .store
            .get_tags(&requested)
            .await?
            .into_iter()
            .filter(|tag| tag.organization_id == organization_id)
            .collect::<Vec<_>>();

        if resolved.len() != requested.len() {
            let found: HashSet<TagId> = resolved.iter().map(|tag| tag.id).collect();
            let missing = requested
                .iter()
                .filter(|id| !found.contains(*id))
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            tracing::warn!(
                requested = requested.len(),
                resolved = resolved.len(),
                "selected tags did not all resolve"
            );
            return Err(LibError::tag_not_found(anyhow!(
                "selected tags not found in organization {}: {}",
                organization_id,
                missing.join(", ")
            )));
        }

        Ok(resolved)
    }

    async fn holders_of(&self, tag_id: TagId) -> Result<Vec<UserId>> {
        let assignments = self.store.get_assignments_by_tag(tag_id).await?;
        Ok(dedup_preserving_order(
            &assignments
                .iter()
                .map(|assignment| assignment.user_id)
                .collect::<Vec<_>>(),
        ))
    }

    /// Fails on the first candidate that is not an existing member of the
    /// tag's organization. Existence is checked for all candidates before
    /// membership.
    async fn ensure_candidates(&self, tag: &Tag, candidates: &[UserId]) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        let existing = self.users.existing_users(candidates).await?;
        if let Some(missing) = candidates.iter().find(|id| !existing.contains(*id)) {
            tracing::warn!(tag_id = %tag.id, user_id = %missing, "candidate user not found");
            return Err(LibError::user_not_found(anyhow!(
                "user {} not found",
                missing
            )));
        }

        let members = self
            .users
            .organization_members(tag.organization_id, candidates)
            .await?;
        if let Some(outsider) = candidates.iter().find(|id| !members.contains(*id)) {
            tracing::warn!(
                tag_id = %tag.id,
                user_id = %outsider,
                "candidate user is not in the tag's organization"
            );
            return Err(LibError::user_not_in_organization(anyhow!(
                "user {} is not a member of organization {}",
                outsider,
                tag.organization_id
            )));
        }

        Ok(())
    }
}

fn assignment_grid(users: &[UserId], tags: &[Tag]) -> Vec<TagAssignment> {
    users
        .iter()
        .flat_map(|user_id| tags.iter().map(move |tag| TagAssignment::new(*user_id, tag)))
        .collect()
}
