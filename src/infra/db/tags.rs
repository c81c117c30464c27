use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateTagParams, FlagTagsWriteRepo, RepoError, TagsRepo, TagsWriteRepo, UpdateTagParams,
};
use crate::domain::entities::TagRecord;

use super::flags::{insert_tags_in_tx, replace_tags_in_tx};
use super::{PostgresRepositories, map_sqlx_error};

const TAG_COLUMNS: &str = "id, application_id, name, color, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TagRow {
    id: Uuid,
    application_id: Uuid,
    name: String,
    color: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            application_id: row.application_id,
            name: row.name,
            color: row.color,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FlagTagRow {
    flag_id: Uuid,
    #[sqlx(flatten)]
    tag: TagRow,
}

#[async_trait]
impl TagsRepo for PostgresRepositories {
    async fn find_tag(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = $1");
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TagRecord::from))
    }

    async fn find_tag_by_name(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> Result<Option<TagRecord>, RepoError> {
        let sql =
            format!("SELECT {TAG_COLUMNS} FROM tags WHERE application_id = $1 AND name = $2");
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(application_id)
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TagRecord::from))
    }

    async fn list_tags(&self, application_id: Uuid) -> Result<Vec<TagRecord>, RepoError> {
        let sql = format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE application_id = $1 ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, TagRow>(&sql)
            .bind(application_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn find_tags_in_application(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<TagRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {TAG_COLUMNS} FROM tags \
             WHERE application_id = $1 AND id = ANY($2) ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, TagRow>(&sql)
            .bind(application_id)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn list_tags_for_flags(
        &self,
        flag_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, TagRecord)>, RepoError> {
        if flag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, FlagTagRow>(
            r#"
            SELECT ft.flag_id, t.id, t.application_id, t.name, t.color, t.created_at, t.updated_at
            FROM flag_tags ft
            INNER JOIN tags t ON t.id = ft.tag_id
            WHERE ft.flag_id = ANY($1)
            ORDER BY t.name, t.id
            "#,
        )
        .bind(flag_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.flag_id, row.tag.into()))
            .collect())
    }
}

#[async_trait]
impl TagsWriteRepo for PostgresRepositories {
    async fn create_tag(&self, params: CreateTagParams) -> Result<TagRecord, RepoError> {
        let sql = format!(
            "INSERT INTO tags (id, application_id, name, color, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {TAG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.application_id)
            .bind(&params.name)
            .bind(&params.color)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_tag(&self, params: UpdateTagParams) -> Result<TagRecord, RepoError> {
        let sql = format!(
            "UPDATE tags SET name = $2, color = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {TAG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(params.id)
            .bind(&params.name)
            .bind(&params.color)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError> {
        // Associations are removed by the flag_tags foreign key cascade.
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FlagTagsWriteRepo for PostgresRepositories {
    async fn replace_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        replace_tags_in_tx(&mut tx, flag_id, tag_ids).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn add_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        insert_tags_in_tx(&mut tx, flag_id, tag_ids).await?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn remove_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        if tag_ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM flag_tags WHERE flag_id = $1 AND tag_id = ANY($2)")
            .bind(flag_id)
            .bind(tag_ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
