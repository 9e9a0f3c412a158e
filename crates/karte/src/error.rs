//! Karte 服务错误定义

use fleet_common::DatastoreError;
use thiserror::Error;
use tonic::{Code, Status};

/// Karte 服务错误类型
#[derive(Error, Debug)]
pub enum KarteError {
    /// 请求参数不合法
    #[error("{0}")]
    InvalidArgument(String),

    /// 过滤表达式无法解析
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// 实体不存在
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    /// 操作前置条件不满足，例如 action 已封存
    #[error("{0}")]
    FailedPrecondition(String),

    /// 数据存储错误
    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// 导出目标写入失败
    #[error("sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KarteError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<KarteError> for Status {
    fn from(err: KarteError) -> Self {
        match err {
            KarteError::Datastore(e) => e.into(),
            KarteError::InvalidArgument(_) | KarteError::InvalidFilter(_) => {
                Status::new(Code::InvalidArgument, err.to_string())
            }
            KarteError::NotFound { .. } => Status::new(Code::NotFound, err.to_string()),
            KarteError::FailedPrecondition(_) => {
                Status::new(Code::FailedPrecondition, err.to_string())
            }
            KarteError::Sink(_) | KarteError::Io(_) | KarteError::Json(_) => {
                Status::new(Code::Internal, err.to_string())
            }
        }
    }
}

pub type KarteResult<T> = Result<T, KarteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let status: Status = KarteError::invalid("action: must be set").into();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status: Status = KarteError::NotFound {
            kind: "action",
            name: "zzzz0".to_string(),
        }
        .into();
        assert_eq!(status.code(), Code::NotFound);

        let status: Status = KarteError::Datastore(DatastoreError::Transient("busy".into())).into();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
