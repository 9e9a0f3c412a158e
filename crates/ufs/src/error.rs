//! UFS 服务错误定义

use fleet_common::{DatastoreError, RealmError};
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Error, Debug)]
pub enum UfsError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id:?} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    /// 例如删除仍被机器引用的机架
    #[error("{0}")]
    FailedPrecondition(String),

    #[error(transparent)]
    Realm(#[from] RealmError),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// 实体中保存的消息无法解码
    #[error("corrupted payload: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl UfsError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<UfsError> for Status {
    fn from(err: UfsError) -> Self {
        match err {
            UfsError::Datastore(e) => e.into(),
            UfsError::Realm(e) => e.into(),
            UfsError::InvalidArgument(_) => Status::new(Code::InvalidArgument, err.to_string()),
            UfsError::NotFound { .. } => Status::new(Code::NotFound, err.to_string()),
            UfsError::AlreadyExists { .. } => Status::new(Code::AlreadyExists, err.to_string()),
            UfsError::FailedPrecondition(_) => {
                Status::new(Code::FailedPrecondition, err.to_string())
            }
            UfsError::Decode(_) => Status::new(Code::Internal, err.to_string()),
        }
    }
}

pub type UfsResult<T> = Result<T, UfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let status: Status = UfsError::NotFound {
            kind: "Machine",
            id: "m1".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::NotFound);
        assert!(status.message().contains("\"m1\""));

        let status: Status = UfsError::FailedPrecondition("rack in use".to_string()).into();
        assert_eq!(status.code(), Code::FailedPrecondition);

        let status: Status = UfsError::Datastore(DatastoreError::Transient("busy".to_string())).into();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
