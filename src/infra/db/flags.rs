use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreateFlagParams, FlagsRepo, FlagsWriteRepo, RepoError, UpdateFlagParams,
};
use crate::domain::entities::FlagRecord;
use crate::domain::types::FlagType;

use super::{PostgresRepositories, map_sqlx_error};

const FLAG_COLUMNS: &str = "id, application_id, key, display_name, description, enabled, \
                            flag_type, value, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FlagRow {
    id: Uuid,
    application_id: Uuid,
    key: String,
    display_name: String,
    description: Option<String>,
    enabled: bool,
    flag_type: FlagType,
    value: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<FlagRow> for FlagRecord {
    fn from(row: FlagRow) -> Self {
        Self {
            id: row.id,
            application_id: row.application_id,
            key: row.key,
            display_name: row.display_name,
            description: row.description,
            enabled: row.enabled,
            flag_type: row.flag_type,
            value: row.value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Make the flag's tag set exactly `tag_ids` inside the caller's transaction.
pub(super) async fn replace_tags_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    flag_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<(), RepoError> {
    sqlx::query("DELETE FROM flag_tags WHERE flag_id = $1")
        .bind(flag_id)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

    insert_tags_in_tx(tx, flag_id, tag_ids).await
}

pub(super) async fn insert_tags_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    flag_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<(), RepoError> {
    if tag_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO flag_tags (flag_id, tag_id)
        SELECT $1, tag_id FROM UNNEST($2::uuid[]) AS t(tag_id)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(flag_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

#[async_trait]
impl FlagsRepo for PostgresRepositories {
    async fn find_flag(&self, id: Uuid) -> Result<Option<FlagRecord>, RepoError> {
        let sql = format!("SELECT {FLAG_COLUMNS} FROM flags WHERE id = $1");
        let row = sqlx::query_as::<_, FlagRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(FlagRecord::from))
    }

    async fn find_flag_by_key(
        &self,
        application_id: Uuid,
        key: &str,
    ) -> Result<Option<FlagRecord>, RepoError> {
        let sql =
            format!("SELECT {FLAG_COLUMNS} FROM flags WHERE application_id = $1 AND key = $2");
        let row = sqlx::query_as::<_, FlagRow>(&sql)
            .bind(application_id)
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(FlagRecord::from))
    }

    async fn list_flags(&self, application_id: Uuid) -> Result<Vec<FlagRecord>, RepoError> {
        let sql = format!(
            "SELECT {FLAG_COLUMNS} FROM flags WHERE application_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, FlagRow>(&sql)
            .bind(application_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FlagRecord::from).collect())
    }

    async fn find_flags_in_application(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<FlagRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {FLAG_COLUMNS} FROM flags \
             WHERE application_id = $1 AND id = ANY($2) \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, FlagRow>(&sql)
            .bind(application_id)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FlagRecord::from).collect())
    }
}

#[async_trait]
impl FlagsWriteRepo for PostgresRepositories {
    async fn create_flag(
        &self,
        params: CreateFlagParams,
        tag_ids: &[Uuid],
    ) -> Result<FlagRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO flags (id, application_id, key, display_name, description, enabled, \
             flag_type, value, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING {FLAG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FlagRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.application_id)
            .bind(&params.key)
            .bind(&params.display_name)
            .bind(&params.description)
            .bind(params.enabled)
            .bind(params.flag_type)
            .bind(&params.value)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        insert_tags_in_tx(&mut tx, row.id, tag_ids).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_flag(
        &self,
        params: UpdateFlagParams,
        tag_ids: Option<&[Uuid]>,
    ) -> Result<FlagRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "UPDATE flags SET display_name = $2, description = $3, enabled = $4, \
             flag_type = $5, value = $6, updated_at = $7 \
             WHERE id = $1 RETURNING {FLAG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FlagRow>(&sql)
            .bind(params.id)
            .bind(&params.display_name)
            .bind(&params.description)
            .bind(params.enabled)
            .bind(params.flag_type)
            .bind(&params.value)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        if let Some(tag_ids) = tag_ids {
            replace_tags_in_tx(&mut tx, row.id, tag_ids).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_flag(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM flags WHERE id = $1")
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
