use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{LibError, Result};
use crate::models::{AssignmentKey, OrganizationId, Tag, TagAssignment, TagId, UserId};
use crate::store::{TagStore, UserDirectory};

/// Number of times each store method was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    pub get_tag: usize,
    pub get_tags: usize,
    pub get_tags_by_parent: usize,
    pub get_assignments_by_tag: usize,
    pub get_assignments_by_user: usize,
    pub get_assignments: usize,
    pub bulk_upserts: usize,
    pub bulk_deletes: usize,
}

impl StoreCallCounts {
    pub fn bulk_writes(&self) -> usize {
        self.bulk_upserts + self.bulk_deletes
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tags: HashMap<TagId, Tag>,
    // Insertion order of tags, so parent lookups answer deterministically.
    tag_order: Vec<TagId>,
    assignments: HashMap<AssignmentKey, TagAssignment>,
    users: HashMap<UserId, HashSet<OrganizationId>>,
    calls: StoreCallCounts,
    fail_writes: bool,
}

/// In-process tag store. Each bulk write runs under a single lock acquisition,
/// so it is applied entirely or not at all.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    state: Mutex<MemoryState>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tag(&self, tag: Tag) {
        let mut state = self.state.lock();
        if state.tags.insert(tag.id, tag.clone()).is_none() {
            state.tag_order.push(tag.id);
        }
    }

    pub fn insert_tags(&self, tags: impl IntoIterator<Item = Tag>) {
        for tag in tags {
            self.insert_tag(tag);
        }
    }

    /// Registers a user as a member of each of `organizations`.
    pub fn insert_user(&self, user_id: UserId, organizations: &[OrganizationId]) {
        let mut state = self.state.lock();
        state
            .users
            .entry(user_id)
            .or_default()
            .extend(organizations.iter().copied());
    }

    /// Seeds an assignment directly, bypassing closure maintenance.
    pub fn insert_assignment(&self, assignment: TagAssignment) {
        self.state
            .lock()
            .assignments
            .insert(assignment.key(), assignment);
    }

    pub fn has_assignment(&self, user_id: UserId, tag_id: TagId) -> bool {
        self.state
            .lock()
            .assignments
            .contains_key(&AssignmentKey { user_id, tag_id })
    }

    /// Every assignment, sorted by key.
    pub fn assignments(&self) -> Vec<TagAssignment> {
        let state = self.state.lock();
        let mut assignments = state.assignments.values().copied().collect::<Vec<_>>();
        assignments.sort_by_key(TagAssignment::key);
        assignments
    }

    pub fn tags(&self) -> Vec<Tag> {
        let state = self.state.lock();
        state
            .tag_order
            .iter()
            .filter_map(|id| state.tags.get(id).cloned())
            .collect()
    }

    pub fn call_counts(&self) -> StoreCallCounts {
        self.state.lock().calls
    }

    /// Makes every subsequent bulk write fail without touching stored rows.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn get_tag(&self, tag_id: TagId) -> Result<Option<Tag>> {
        let mut state = self.state.lock();
        state.calls.get_tag += 1;
        Ok(state.tags.get(&tag_id).cloned())
    }

    async fn get_tags(&self, tag_ids: &[TagId]) -> Result<Vec<Tag>> {
        let mut state = self.state.lock();
        state.calls.get_tags += 1;
        Ok(tag_ids
            .iter()
            .filter_map(|id| state.tags.get(id).cloned())
            .collect())
    }

    async fn get_tags_by_parent(&self, parent_ids: &HashSet<TagId>) -> Result<Vec<Tag>> {
        let mut state = self.state.lock();
        state.calls.get_tags_by_parent += 1;
        Ok(state
            .tag_order
            .iter()
            .filter_map(|id| state.tags.get(id))
            .filter(|tag| {
                tag.parent_tag_id
                    .is_some_and(|parent_id| parent_ids.contains(&parent_id))
            })
            .cloned()
            .collect())
    }

    async fn get_assignments_by_tag(&self, tag_id: TagId) -> Result<Vec<TagAssignment>> {
        let mut state = self.state.lock();
        state.calls.get_assignments_by_tag += 1;
        let mut assignments = state
            .assignments
            .values()
            .filter(|assignment| assignment.tag_id == tag_id)
            .copied()
            .collect::<Vec<_>>();
        assignments.sort_by_key(TagAssignment::key);
        Ok(assignments)
    }

    async fn get_assignments_by_user(&self, user_id: UserId) -> Result<Vec<TagAssignment>> {
        let mut state = self.state.lock();
        state.calls.get_assignments_by_user += 1;
        let mut assignments = state
            .assignments
            .values()
            .filter(|assignment| assignment.user_id == user_id)
            .copied()
            .collect::<Vec<_>>();
        assignments.sort_by_key(TagAssignment::key);
        Ok(assignments)
    }

    async fn get_assignments(
        &self,
        user_ids: &[UserId],
        tag_ids: &[TagId],
    ) -> Result<Vec<TagAssignment>> {
        let mut state = self.state.lock();
        state.calls.get_assignments += 1;
        let mut found = Vec::new();
        for user_id in user_ids {
            for tag_id in tag_ids {
                let key = AssignmentKey {
                    user_id: *user_id,
                    tag_id: *tag_id,
                };
                if let Some(assignment) = state.assignments.get(&key) {
                    found.push(*assignment);
                }
            }
        }
        Ok(found)
    }

    async fn bulk_upsert_assignments(&self, entries: &[TagAssignment]) -> Result<u64> {
        let mut state = self.state.lock();
        state.calls.bulk_upserts += 1;
        if state.fail_writes {
            return Err(LibError::database(
                "Failed to write tag assignments",
                anyhow!("memory store rejected upsert of {} entries", entries.len()),
            ));
        }

        let mut inserted = 0u64;
        for entry in entries {
            if let Entry::Vacant(slot) = state.assignments.entry(entry.key()) {
                slot.insert(*entry);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn bulk_delete_assignments(&self, entries: &[AssignmentKey]) -> Result<u64> {
        let mut state = self.state.lock();
        state.calls.bulk_deletes += 1;
        if state.fail_writes {
            return Err(LibError::database(
                "Failed to delete tag assignments",
                anyhow!("memory store rejected delete of {} entries", entries.len()),
            ));
        }

        let mut deleted = 0u64;
        for key in entries {
            if state.assignments.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl UserDirectory for MemoryTagStore {
    async fn existing_users(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>> {
        let state = self.state.lock();
        Ok(user_ids
            .iter()
            .filter(|id| state.users.contains_key(*id))
            .copied()
            .collect())
    }

    async fn organization_members(
        &self,
        organization_id: OrganizationId,
        user_ids: &[UserId],
    ) -> Result<HashSet<UserId>> {
        let state = self.state.lock();
        Ok(user_ids
            .iter()
            .filter(|id| {
                state
                    .users
                    .get(*id)
                    .is_some_and(|orgs| orgs.contains(&organization_id))
            })
            .copied()
            .collect())
    }
}
