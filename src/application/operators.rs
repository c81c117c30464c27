use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{OperatorsRepo, RepoError, UpsertOperatorParams};
use crate::domain::entities::{ApplicationRecord, OperatorRecord};
use crate::domain::types::OperatorRole;

const TOKEN_PREFIX: &str = "fc";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("operator email must not be blank")]
    InvalidEmail,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing operator token")]
    Missing,
    #[error("invalid operator token")]
    Invalid,
    #[error("revoked operator token")]
    Revoked,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct OperatorIssued {
    pub record: OperatorRecord,
    pub token: String,
}

/// Authenticated caller of the management API.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub operator_id: Uuid,
    pub email: String,
    pub role: OperatorRole,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == OperatorRole::Admin
    }

    /// Owners and admins may read and mutate an application.
    pub fn can_manage(&self, application: &ApplicationRecord) -> bool {
        self.is_admin() || application.owner_id == self.operator_id
    }
}

#[derive(Clone)]
pub struct OperatorService {
    repo: Arc<dyn OperatorsRepo>,
}

impl OperatorService {
    pub fn new(repo: Arc<dyn OperatorsRepo>) -> Self {
        Self { repo }
    }

    /// Create the operator or rotate its token, returning the plaintext token once.
    pub async fn issue(
        &self,
        email: &str,
        role: OperatorRole,
    ) -> Result<OperatorIssued, OperatorError> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(OperatorError::InvalidEmail);
        }

        let prefix = Self::generate_prefix();
        let secret = Self::generate_secret();
        let token = format!("{TOKEN_PREFIX}_{prefix}_{secret}");

        let record = self
            .repo
            .upsert_operator(UpsertOperatorParams {
                email,
                role,
                token_prefix: prefix,
                hashed_secret: Self::hash_secret(&secret),
            })
            .await?;

        Ok(OperatorIssued { record, token })
    }

    pub async fn revoke(&self, email: &str) -> Result<(), OperatorError> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(OperatorError::InvalidEmail);
        }
        self.repo
            .revoke_operator(&email, OffsetDateTime::now_utc())
            .await?;
        Ok(())
    }

    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::Missing);
        }
        let parsed = Self::parse_token(token).ok_or(AuthError::Invalid)?;
        let record = self
            .repo
            .find_by_token_prefix(&parsed.prefix)
            .await?
            .ok_or(AuthError::Invalid)?;

        if let Some(revoked_at) = record.revoked_at
            && revoked_at <= OffsetDateTime::now_utc()
        {
            return Err(AuthError::Revoked);
        }

        let hashed_input = Self::hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(AuthError::Invalid);
        }

        Ok(Principal {
            operator_id: record.id,
            email: record.email,
            role: record.role,
        })
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_prefix() -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str) -> Option<ParsedToken> {
        let mut parts = token.trim().splitn(3, '_');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let prefix = parts.next()?;
        let secret = parts.next()?;
        if secret.len() < MIN_SECRET_LEN || prefix.is_empty() {
            return None;
        }
        Some(ParsedToken {
            prefix: prefix.to_string(),
            secret: secret.to_string(),
        })
    }
}

struct ParsedToken {
    prefix: String,
    secret: String,
}
