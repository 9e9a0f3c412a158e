//! Realm 错误类型定义
//!
//! 定义了 Realm 权限检查相关的错误类型

use thiserror::Error;
use tonic::Status;

use crate::error::DatastoreError;

#[derive(Debug, Error)]
pub enum RealmError {
    #[error("Invalid realm {realm:?}: {reason}")]
    InvalidRealm { realm: String, reason: String },

    #[error("{identity} does not have permission {permission} in realm {realm}")]
    PermissionDenied {
        identity: String,
        permission: String,
        realm: String,
    },

    #[error("Grant not found")]
    GrantNotFound,

    #[error("Datastore error: {0}")]
    Datastore(#[from] DatastoreError),
}

impl RealmError {
    pub fn invalid(realm: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRealm {
            realm: realm.into(),
            reason: reason.into(),
        }
    }
}

impl From<RealmError> for Status {
    fn from(err: RealmError) -> Self {
        match err {
            RealmError::InvalidRealm { .. } => Status::invalid_argument(err.to_string()),
            RealmError::PermissionDenied { .. } => Status::permission_denied(err.to_string()),
            RealmError::GrantNotFound => Status::not_found(err.to_string()),
            RealmError::Datastore(e) => e.into(),
        }
    }
}

pub type RealmResult<T> = Result<T, RealmError>;
