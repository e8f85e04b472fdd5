use std::collections::{HashMap, HashSet};

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{AssignmentKey, ClosureViolation, Tag, TagAssignment, TagId};

/// Checks a snapshot of tags and assignments against the ancestor-closure rule.
///
/// A parent id missing from `tags` is treated as a broken chain and not
/// reported, matching how assignment resolves ancestors.
pub fn closure_violations(tags: &[Tag], assignments: &[TagAssignment]) -> Vec<ClosureViolation> {
    let tags_by_id: HashMap<TagId, &Tag> = tags.iter().map(|tag| (tag.id, tag)).collect();
    let held: HashSet<AssignmentKey> = assignments.iter().map(TagAssignment::key).collect();

    let mut violations = Vec::new();
    for assignment in assignments {
        let Some(tag) = tags_by_id.get(&assignment.tag_id) else {
            violations.push(ClosureViolation::UnknownTag {
                user_id: assignment.user_id,
                tag_id: assignment.tag_id,
            });
            continue;
        };

        if assignment.organization_id != tag.organization_id {
            violations.push(ClosureViolation::OrganizationMismatch {
                user_id: assignment.user_id,
                tag_id: tag.id,
                assignment_organization_id: assignment.organization_id,
                tag_organization_id: tag.organization_id,
            });
        }

        let Some(parent_id) = tag.parent_tag_id else {
            continue;
        };
        if !tags_by_id.contains_key(&parent_id) {
            continue;
        }
        let parent_key = AssignmentKey {
            user_id: assignment.user_id,
            tag_id: parent_id,
        };
        if !held.contains(&parent_key) {
            violations.push(ClosureViolation::MissingAncestor {
                user_id: assignment.user_id,
                tag_id: tag.id,
                missing_parent_id: parent_id,
            });
        }
    }

    violations
}

pub fn ensure_closure(tags: &[Tag], assignments: &[TagAssignment]) -> Result<()> {
    let violations = closure_violations(tags, assignments);
    if let Some(first) = violations.first() {
        return Err(LibError::invalid_with_code(
            first.error_code(),
            first.public_message(),
            anyhow!(
                "tag closure validation failed with {} violation(s): {:?}",
                violations.len(),
                violations
            ),
        ));
    }

    Ok(())
}
