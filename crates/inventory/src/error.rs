//! Inventory 服务错误定义

use fleet_common::DatastoreError;
use fleet_common::retry::Transient;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    /// 例如备用池中的 DUT 不足
    #[error("{0}")]
    FailedPrecondition(String),

    /// 提交时库存已被其他写入修改
    #[error("inventory revision conflict: expected {expected:?}, found {actual:?}")]
    Conflict { expected: String, actual: String },

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InventoryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn dut_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "DUT",
            id: id.into(),
        }
    }
}

impl Transient for InventoryError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Datastore(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<InventoryError> for Status {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Datastore(e) => e.into(),
            InventoryError::InvalidArgument(_) => Status::new(Code::InvalidArgument, err.to_string()),
            InventoryError::NotFound { .. } => Status::new(Code::NotFound, err.to_string()),
            InventoryError::FailedPrecondition(_) => {
                Status::new(Code::FailedPrecondition, err.to_string())
            }
            InventoryError::Conflict { .. } => Status::new(Code::Aborted, err.to_string()),
            InventoryError::Io(_) | InventoryError::Json(_) => {
                Status::new(Code::Internal, err.to_string())
            }
        }
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let status: Status = InventoryError::dut_not_found("d1").into();
        assert_eq!(status.code(), Code::NotFound);

        let conflict = InventoryError::Conflict {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(conflict.is_transient());
        assert_eq!(Status::from(conflict).code(), Code::Aborted);

        assert!(!InventoryError::invalid("x").is_transient());
        let status: Status = InventoryError::FailedPrecondition("no spares".into()).into();
        assert_eq!(status.code(), Code::FailedPrecondition);
    }
}
