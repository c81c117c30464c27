use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{DistributionRepo, RepoError};
use crate::domain::entities::{DistributedFlag, DistributionSet};
use crate::domain::types::FlagType;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct DistributedFlagRow {
    key: String,
    enabled: bool,
    display_name: String,
    description: Option<String>,
    value: String,
    flag_type: FlagType,
}

impl From<DistributedFlagRow> for DistributedFlag {
    fn from(row: DistributedFlagRow) -> Self {
        Self {
            key: row.key,
            enabled: row.enabled,
            display_name: row.display_name,
            description: row.description,
            value: row.value,
            flag_type: row.flag_type,
        }
    }
}

#[derive(sqlx::FromRow)]
struct KeyedFlagRow {
    application_id: Uuid,
    #[sqlx(flatten)]
    flag: DistributedFlagRow,
}

#[derive(sqlx::FromRow)]
struct AccessKeyRow {
    id: Uuid,
    access_key: String,
}

#[async_trait]
impl DistributionRepo for PostgresRepositories {
    async fn load_distribution(
        &self,
        access_key: &str,
    ) -> Result<Option<DistributionSet>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let Some(application) = sqlx::query_as::<_, AccessKeyRow>(
            "SELECT id, access_key FROM applications WHERE access_key = $1",
        )
        .bind(access_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, DistributedFlagRow>(
            r#"
            SELECT key, enabled, display_name, description, value, flag_type
            FROM flags
            WHERE application_id = $1 AND enabled
            ORDER BY created_at, id
            "#,
        )
        .bind(application.id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(DistributionSet {
            access_key: application.access_key,
            flags: rows.into_iter().map(DistributedFlag::from).collect(),
        }))
    }

    async fn load_all_distributions(&self) -> Result<Vec<DistributionSet>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let applications = sqlx::query_as::<_, AccessKeyRow>(
            "SELECT id, access_key FROM applications ORDER BY created_at, id",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, KeyedFlagRow>(
            r#"
            SELECT application_id, key, enabled, display_name, description, value, flag_type
            FROM flags
            WHERE enabled
            ORDER BY application_id, created_at, id
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<DistributedFlag>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.application_id)
                .or_default()
                .push(row.flag.into());
        }

        Ok(applications
            .into_iter()
            .map(|application| DistributionSet {
                flags: grouped.remove(&application.id).unwrap_or_default(),
                access_key: application.access_key,
            })
            .collect())
    }
}
