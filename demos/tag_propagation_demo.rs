use std::env;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use subseq_tags::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("subseq_tags=debug")),
        )
        .init();

    let member_count: usize = env::var("TAG_DEMO_MEMBERS")
        .unwrap_or_else(|_| "3".to_string())
        .parse()
        .context("invalid TAG_DEMO_MEMBERS")?;

    let store = Arc::new(MemoryTagStore::new());
    let org = OrganizationId::new_v4();
    let volunteers = Tag::root(org, "Volunteers");
    let drivers = Tag::child_of(&volunteers, "Drivers");
    let night_shift = Tag::child_of(&drivers, "Night shift");
    let mentors = Tag::root(org, "Mentors");
    store.insert_tags([
        volunteers.clone(),
        drivers.clone(),
        night_shift.clone(),
        mentors.clone(),
    ]);

    let members = (0..member_count)
        .map(|_| {
            let user = UserId::new_v4();
            store.insert_user(user, &[org]);
            user
        })
        .collect::<Vec<_>>();

    let ops = TagOperations::new(Arc::clone(&store));
    ops.add_people_to_tag(night_shift.id, &members).await?;
    ops.assign_selected_tags_to_holders(drivers.id, &[mentors.id])
        .await?;
    ops.remove_selected_tags_from_holders(volunteers.id, &[drivers.id])
        .await?;

    ensure_closure(&store.tags(), &store.assignments())?;

    let first = members.first().copied().context("TAG_DEMO_MEMBERS must be at least 1")?;
    let held = ops.tags_assigned_to_user(first, Some(org)).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "assignments": store.assignments().len(),
            "firstMemberTags": held.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>(),
            "storeWrites": store.call_counts().bulk_writes(),
        }))?
    );

    Ok(())
}
