use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Tag, TagId};
use crate::store::TagStore;

/// Returns `tag` followed by its parent, grandparent and so on up to the root.
///
/// One store lookup per hop. A parent id that does not resolve ends the walk
/// early instead of failing: the chain collected so far is returned.
pub async fn resolve_ancestors<S>(store: &S, tag: &Tag) -> Result<Vec<Tag>>
where
    S: TagStore + ?Sized,
{
    let mut chain = vec![tag.clone()];
    let mut next_parent = tag.parent_tag_id;

    while let Some(parent_id) = next_parent {
        match store.get_tag(parent_id).await? {
            Some(parent) => {
                next_parent = parent.parent_tag_id;
                chain.push(parent);
            }
            None => {
                tracing::warn!(
                    tag_id = %tag.id,
                    missing_parent_id = %parent_id,
                    "ancestor chain is broken, stopping at last resolved tag"
                );
                break;
            }
        }
    }

    Ok(chain)
}

/// Expands `roots` to every tag beneath them, roots included.
///
/// Breadth-first with one `get_tags_by_parent` call per level. Roots keep their
/// input order, followed by each level in the order the store returns it.
/// Overlapping roots (a root that is also a descendant of another root) are
/// only reported once.
pub async fn resolve_descendants<S>(store: &S, roots: &[Tag]) -> Result<Vec<Tag>>
where
    S: TagStore + ?Sized,
{
    let mut visited: HashSet<TagId> = HashSet::with_capacity(roots.len());
    let mut resolved = Vec::with_capacity(roots.len());
    for root in roots {
        if visited.insert(root.id) {
            resolved.push(root.clone());
        }
    }

    let mut frontier: HashSet<TagId> = visited.clone();
    let mut depth = 0usize;
    while !frontier.is_empty() {
        let children = store.get_tags_by_parent(&frontier).await?;
        if children.is_empty() {
            break;
        }

        let mut next_frontier = HashSet::with_capacity(children.len());
        for child in children {
            if visited.insert(child.id) {
                next_frontier.insert(child.id);
                resolved.push(child);
            }
        }

        depth += 1;
        tracing::debug!(
            depth,
            discovered = next_frontier.len(),
            "expanded descendant frontier"
        );
        frontier = next_frontier;
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTagStore;
    use crate::models::OrganizationId;

    fn ids(tags: &[Tag]) -> Vec<TagId> {
        tags.iter().map(|tag| tag.id).collect()
    }

    fn chain() -> (MemoryTagStore, Tag, Tag, Tag) {
        let root = Tag::root(OrganizationId::new_v4(), "Root");
        let mid = Tag::child_of(&root, "Mid");
        let leaf = Tag::child_of(&mid, "Leaf");
        let store = MemoryTagStore::new();
        store.insert_tags([root.clone(), mid.clone(), leaf.clone()]);
        (store, root, mid, leaf)
    }

    #[tokio::test]
    async fn ancestors_walk_from_tag_to_root() {
        let (store, root, mid, leaf) = chain();

        let ancestors = resolve_ancestors(&store, &leaf)
            .await
            .expect("ancestors should resolve");

        assert_eq!(ids(&ancestors), vec![leaf.id, mid.id, root.id]);
        assert_eq!(store.call_counts().get_tag, 2);
    }

    #[tokio::test]
    async fn ancestors_of_root_is_just_the_root() {
        let (store, root, _, _) = chain();

        let ancestors = resolve_ancestors(&store, &root)
            .await
            .expect("ancestors should resolve");

        assert_eq!(ids(&ancestors), vec![root.id]);
        assert_eq!(store.call_counts().get_tag, 0);
    }

    #[tokio::test]
    async fn ancestors_stop_at_unresolved_parent() {
        let org = OrganizationId::new_v4();
        let detached_parent = Tag::root(org, "Deleted");
        let mid = Tag::child_of(&detached_parent, "Mid");
        let leaf = Tag::child_of(&mid, "Leaf");
        let store = MemoryTagStore::new();
        store.insert_tags([mid.clone(), leaf.clone()]);

        let ancestors = resolve_ancestors(&store, &leaf)
            .await
            .expect("broken chain should not fail");

        assert_eq!(ids(&ancestors), vec![leaf.id, mid.id]);
    }

    #[tokio::test]
    async fn descendants_include_roots_and_every_level() {
        let org = OrganizationId::new_v4();
        let x = Tag::root(org, "X");
        let x1 = Tag::child_of(&x, "X1");
        let x2 = Tag::child_of(&x, "X2");
        let x1a = Tag::child_of(&x1, "X1a");
        let unrelated = Tag::root(org, "Other");
        let store = MemoryTagStore::new();
        store.insert_tags([x.clone(), x1.clone(), x2.clone(), x1a.clone(), unrelated]);

        let descendants = resolve_descendants(&store, std::slice::from_ref(&x))
            .await
            .expect("descendants should resolve");

        assert_eq!(ids(&descendants), vec![x.id, x1.id, x2.id, x1a.id]);
        // Two non-empty levels plus the terminating empty lookup.
        assert_eq!(store.call_counts().get_tags_by_parent, 3);
    }

    #[tokio::test]
    async fn descendants_of_leaf_is_the_leaf() {
        let (store, _, _, leaf) = chain();

        let descendants = resolve_descendants(&store, std::slice::from_ref(&leaf))
            .await
            .expect("descendants should resolve");

        assert_eq!(ids(&descendants), vec![leaf.id]);
        assert_eq!(store.call_counts().get_tags_by_parent, 1);
    }

    #[tokio::test]
    async fn descendants_merge_disjoint_and_overlapping_roots() {
        let org = OrganizationId::new_v4();
        let a = Tag::root(org, "A");
        let a1 = Tag::child_of(&a, "A1");
        let a1x = Tag::child_of(&a1, "A1x");
        let b = Tag::root(org, "B");
        let b1 = Tag::child_of(&b, "B1");
        let store = MemoryTagStore::new();
        store.insert_tags([a.clone(), a1.clone(), a1x.clone(), b.clone(), b1.clone()]);

        let descendants = resolve_descendants(&store, &[a.clone(), a1.clone(), b.clone(), a.clone()])
            .await
            .expect("descendants should resolve");

        let found: HashSet<TagId> = ids(&descendants).into_iter().collect();
        assert_eq!(descendants.len(), 5);
        assert_eq!(found, HashSet::from([a.id, a1.id, a1x.id, b.id, b1.id]));
        assert_eq!(&ids(&descendants)[..3], &[a.id, a1.id, b.id]);
    }

    #[tokio::test]
    async fn descendants_of_nothing_is_empty() {
        let store = MemoryTagStore::new();

        let descendants = resolve_descendants(&store, &[])
            .await
            .expect("empty input should resolve");

        assert!(descendants.is_empty());
        assert_eq!(store.call_counts().get_tags_by_parent, 0);
    }
}
