//! Weetbix 服务错误定义

use fleet_common::{DatastoreError, RealmError};
use thiserror::Error;
use tonic::{Code, Status};

use crate::rules::lang::ParseError;

/// 规则校验错误
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule definition: {0}")]
    Definition(#[from] ParseError),

    #[error("bug: {0}")]
    Bug(String),

    #[error("{0}")]
    Invalid(String),
}

/// Weetbix 服务错误类型
#[derive(Error, Debug)]
pub enum WeetbixError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    /// etag 不匹配，调用方需要重新读取后再更新
    #[error("{0}")]
    Aborted(String),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Realm(#[from] RealmError),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeetbixError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<ParseError> for WeetbixError {
    fn from(err: ParseError) -> Self {
        Self::Rule(RuleError::Definition(err))
    }
}

impl From<WeetbixError> for Status {
    fn from(err: WeetbixError) -> Self {
        match err {
            WeetbixError::Datastore(e) => e.into(),
            WeetbixError::Realm(e) => e.into(),
            WeetbixError::InvalidArgument(_) | WeetbixError::Rule(_) => {
                Status::new(Code::InvalidArgument, err.to_string())
            }
            WeetbixError::NotFound(_) => Status::new(Code::NotFound, err.to_string()),
            WeetbixError::AlreadyExists(_) => Status::new(Code::AlreadyExists, err.to_string()),
            WeetbixError::Aborted(_) => Status::new(Code::Aborted, err.to_string()),
            WeetbixError::Json(_) => Status::new(Code::Internal, err.to_string()),
        }
    }
}

pub type WeetbixResult<T> = Result<T, WeetbixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let status: Status = WeetbixError::invalid("parent: unspecified").into();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status: Status = WeetbixError::from(RuleError::Bug("unknown system".to_string())).into();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status: Status = WeetbixError::Aborted("etag mismatch".to_string()).into();
        assert_eq!(status.code(), Code::Aborted);

        let status: Status = WeetbixError::Datastore(DatastoreError::not_found("Rule", "x")).into();
        assert_eq!(status.code(), Code::NotFound);
    }
}
