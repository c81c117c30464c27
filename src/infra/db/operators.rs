use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{OperatorsRepo, RepoError, UpsertOperatorParams};
use crate::domain::entities::OperatorRecord;
use crate::domain::types::OperatorRole;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct OperatorRow {
    id: Uuid,
    email: String,
    role: OperatorRole,
    token_prefix: String,
    hashed_secret: Vec<u8>,
    revoked_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<OperatorRow> for OperatorRecord {
    fn from(row: OperatorRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: row.role,
            token_prefix: row.token_prefix,
            hashed_secret: row.hashed_secret,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl OperatorsRepo for PostgresRepositories {
    async fn find_by_token_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<OperatorRecord>, RepoError> {
        let row = sqlx::query_as::<_, OperatorRow>(
            r#"
            SELECT id, email, role, token_prefix, hashed_secret, revoked_at, created_at, updated_at
            FROM operators
            WHERE token_prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(OperatorRecord::from))
    }

    async fn upsert_operator(
        &self,
        params: UpsertOperatorParams,
    ) -> Result<OperatorRecord, RepoError> {
        let row = sqlx::query_as::<_, OperatorRow>(
            r#"
            INSERT INTO operators (id, email, role, token_prefix, hashed_secret, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (email) DO UPDATE
            SET role = EXCLUDED.role,
                token_prefix = EXCLUDED.token_prefix,
                hashed_secret = EXCLUDED.hashed_secret,
                revoked_at = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING id, email, role, token_prefix, hashed_secret, revoked_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&params.email)
        .bind(params.role)
        .bind(&params.token_prefix)
        .bind(&params.hashed_secret)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn revoke_operator(&self, email: &str, at: OffsetDateTime) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE operators SET revoked_at = $2, updated_at = $2 WHERE email = $1",
        )
        .bind(email)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
