use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::models::{AssignmentKey, OrganizationId, Tag, TagAssignment, TagId, UserId};
use crate::store::{TagStore, UserDirectory};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_tag_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection settings for [`PgTagStore`].
#[derive(Debug, Clone)]
pub struct PgTagStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PgTagStoreConfig {
    /// Reads `DATABASE_URL` and the optional `TAG_STORE_MAX_CONNECTIONS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = match env::var("TAG_STORE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse::<u32>()
                .with_context(|| format!("invalid TAG_STORE_MAX_CONNECTIONS value {value:?}"))?,
            Err(env::VarError::NotPresent) => DEFAULT_MAX_CONNECTIONS,
            Err(err) => return Err(anyhow!(err).context("failed to read TAG_STORE_MAX_CONNECTIONS")),
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct TagRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    parent_tag_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
struct AssignmentRow {
    user_id: Uuid,
    tag_id: Uuid,
    organization_id: Uuid,
}

impl From<TagRow> for Tag {
    fn from(value: TagRow) -> Self {
        Self {
            id: TagId(value.id),
            organization_id: OrganizationId(value.organization_id),
            name: value.name,
            parent_tag_id: value.parent_tag_id.map(TagId),
        }
    }
}

impl From<AssignmentRow> for TagAssignment {
    fn from(value: AssignmentRow) -> Self {
        Self {
            user_id: UserId(value.user_id),
            tag_id: TagId(value.tag_id),
            organization_id: OrganizationId(value.organization_id),
        }
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

fn tag_uuids(ids: &[TagId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.0).collect()
}

fn user_uuids(ids: &[UserId]) -> Vec<Uuid> {
    ids.iter().map(|id| id.0).collect()
}

/// Postgres-backed [`TagStore`] and [`UserDirectory`].
///
/// Tag tables live in the `tags` schema created by [`create_tag_tables`];
/// users and memberships are read from the auth layer's `auth` schema.
#[derive(Clone)]
pub struct PgTagStore {
    pool: Arc<PgPool>,
}

impl PgTagStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
        }
    }

    /// Opens a pool from `config` and runs pending migrations.
    pub async fn connect(config: &PgTagStoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|err| db_err("Failed to connect to tag database", err))?;
        create_tag_tables(&pool).await.map_err(|err| {
            LibError::database("Failed to migrate tag tables", anyhow!(err))
        })?;
        tracing::info!(
            max_connections = config.max_connections,
            "connected tag store"
        );
        Ok(Self::new(Arc::new(pool)))
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

#[async_trait]
impl TagStore for PgTagStore {
    async fn get_tag(&self, tag_id: TagId) -> Result<Option<Tag>> {
        let row = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT id, organization_id, name, parent_tag_id
            FROM tags.tags
            WHERE id = $1
            "#,
        )
        .bind(tag_id.0)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query tag", err))?;

        Ok(row.map(Tag::from))
    }

    async fn get_tags(&self, tag_ids: &[TagId]) -> Result<Vec<Tag>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT id, organization_id, name, parent_tag_id
            FROM tags.tags
            WHERE id = ANY($1)
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(tag_uuids(tag_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query tags", err))?;

        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn get_tags_by_parent(&self, parent_ids: &HashSet<TagId>) -> Result<Vec<Tag>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let parents = parent_ids.iter().map(|id| id.0).collect::<Vec<_>>();
        let rows = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT id, organization_id, name, parent_tag_id
            FROM tags.tags
            WHERE parent_tag_id = ANY($1)
            ORDER BY name ASC, id ASC
            "#,
        )
        .bind(parents)
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query child tags", err))?;

        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn get_assignments_by_tag(&self, tag_id: TagId) -> Result<Vec<TagAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, tag_id, organization_id
            FROM tags.tag_assignments
            WHERE tag_id = $1
            ORDER BY user_id ASC
            "#,
        )
        .bind(tag_id.0)
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query tag holders", err))?;

        Ok(rows.into_iter().map(TagAssignment::from).collect())
    }

    async fn get_assignments_by_user(&self, user_id: UserId) -> Result<Vec<TagAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, tag_id, organization_id
            FROM tags.tag_assignments
            WHERE user_id = $1
            ORDER BY tag_id ASC
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query user tags", err))?;

        Ok(rows.into_iter().map(TagAssignment::from).collect())
    }

    async fn get_assignments(
        &self,
        user_ids: &[UserId],
        tag_ids: &[TagId],
    ) -> Result<Vec<TagAssignment>> {
        if user_ids.is_empty() || tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, tag_id, organization_id
            FROM tags.tag_assignments
            WHERE user_id = ANY($1)
              AND tag_id = ANY($2)
            "#,
        )
        .bind(user_uuids(user_ids))
        .bind(tag_uuids(tag_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query tag assignments", err))?;

        Ok(rows.into_iter().map(TagAssignment::from).collect())
    }

    async fn bulk_upsert_assignments(&self, entries: &[TagAssignment]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let user_ids = entries.iter().map(|e| e.user_id.0).collect::<Vec<_>>();
        let tag_ids = entries.iter().map(|e| e.tag_id.0).collect::<Vec<_>>();
        let organization_ids = entries
            .iter()
            .map(|e| e.organization_id.0)
            .collect::<Vec<_>>();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        let result = sqlx::query(
            r#"
            INSERT INTO tags.tag_assignments (user_id, tag_id, organization_id)
            SELECT *
            FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[])
            ON CONFLICT (user_id, tag_id) DO NOTHING
            "#,
        )
        .bind(user_ids)
        .bind(tag_ids)
        .bind(organization_ids)
        .execute(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to write tag assignments", err))?;

        tx.commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))?;

        Ok(result.rows_affected())
    }

    async fn bulk_delete_assignments(&self, entries: &[AssignmentKey]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let user_ids = entries.iter().map(|e| e.user_id.0).collect::<Vec<_>>();
        let tag_ids = entries.iter().map(|e| e.tag_id.0).collect::<Vec<_>>();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err("Failed to start transaction", err))?;

        let result = sqlx::query(
            r#"
            DELETE FROM tags.tag_assignments a
            USING UNNEST($1::uuid[], $2::uuid[]) AS d(user_id, tag_id)
            WHERE a.user_id = d.user_id
              AND a.tag_id = d.tag_id
            "#,
        )
        .bind(user_ids)
        .bind(tag_ids)
        .execute(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to delete tag assignments", err))?;

        tx.commit()
            .await
            .map_err(|err| db_err("Failed to commit transaction", err))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserDirectory for PgTagStore {
    async fn existing_users(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM auth.users
            WHERE id = ANY($1)
            "#,
        )
        .bind(user_uuids(user_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query users", err))?;

        Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
    }

    async fn organization_members(
        &self,
        organization_id: OrganizationId,
        user_ids: &[UserId],
    ) -> Result<HashSet<UserId>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT member_id
            FROM auth.organization_memberships
            WHERE organization_id = $1
              AND member_id = ANY($2)
            "#,
        )
        .bind(organization_id.0)
        .bind(user_uuids(user_ids))
        .fetch_all(&*self.pool)
        .await
        .map_err(|err| db_err("Failed to query organization membership", err))?;

        Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
    }
}
