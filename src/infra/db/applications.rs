use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ApplicationsRepo, ApplicationsWriteRepo, CreateApplicationParams, RepoError,
};
use crate::domain::entities::{ApplicationRecord, ApplicationSummary};

use super::{PostgresRepositories, map_sqlx_error};

const APPLICATION_COLUMNS: &str = "id, name, access_key, owner_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: Uuid,
    name: String,
    access_key: String,
    owner_id: Uuid,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ApplicationRow> for ApplicationRecord {
    fn from(row: ApplicationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            access_key: row.access_key,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationSummaryRow {
    #[sqlx(flatten)]
    application: ApplicationRow,
    flag_count: i64,
}

#[async_trait]
impl ApplicationsRepo for PostgresRepositories {
    async fn find_application(&self, id: Uuid) -> Result<Option<ApplicationRecord>, RepoError> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1");
        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ApplicationRecord::from))
    }

    async fn list_owned_applications(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ApplicationSummary>, RepoError> {
        let rows = sqlx::query_as::<_, ApplicationSummaryRow>(
            r#"
            SELECT
                a.id,
                a.name,
                a.access_key,
                a.owner_id,
                a.created_at,
                a.updated_at,
                (SELECT COUNT(*) FROM flags f WHERE f.application_id = a.id) AS flag_count
            FROM applications a
            WHERE a.owner_id = $1
            ORDER BY a.updated_at DESC, a.id
            "#,
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(ApplicationSummary {
                    flag_count: Self::convert_count(row.flag_count)?,
                    application: row.application.into(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ApplicationsWriteRepo for PostgresRepositories {
    async fn create_application(
        &self,
        params: CreateApplicationParams,
    ) -> Result<ApplicationRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let sql = format!(
            "INSERT INTO applications (id, name, access_key, owner_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {APPLICATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ApplicationRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&params.name)
            .bind(&params.access_key)
            .bind(params.owner_id)
            .bind(now)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn delete_application(&self, id: Uuid) -> Result<(), RepoError> {
        // Flags, tags and their associations go with the row through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
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
