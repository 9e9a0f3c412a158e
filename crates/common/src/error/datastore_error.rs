//! 数据存储错误类型
//!
//! 所有 Datastore 后端共用的错误定义，以及到 RPC 状态码的映射

use thiserror::Error;
use tonic::{Code, Status};

/// 数据存储错误
#[derive(Error, Debug)]
pub enum DatastoreError {
    /// 实体不存在
    #[error("Entity {kind}/{id} not found")]
    NotFound { kind: String, id: String },

    /// 实体已存在（insert 语义）
    #[error("Entity {kind}/{id} already exists")]
    AlreadyExists { kind: String, id: String },

    /// 参数不合法，例如空 ID
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 无法解析的分页游标
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// 实体序列化/反序列化失败
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 可重试的临时错误（锁冲突、连接池超时等）
    #[error("Transient datastore error: {0}")]
    Transient(String),

    /// 后端错误
    #[error("Datastore backend error: {0}")]
    Backend(String),

    /// 配置错误
    #[error("Datastore configuration error: {0}")]
    Config(String),
}

impl DatastoreError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// 是否为可重试错误
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for DatastoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Transient(err.to_string()),
            sqlx::Error::Database(db_err) => {
                // SQLITE_BUSY(5) / SQLITE_LOCKED(6)，扩展码低 8 位相同
                let busy = db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .is_some_and(|code| matches!(code & 0xff, 5 | 6));
                if busy {
                    Self::Transient(err.to_string())
                } else {
                    Self::Backend(err.to_string())
                }
            }
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<DatastoreError> for Status {
    fn from(err: DatastoreError) -> Self {
        let code = match &err {
            DatastoreError::NotFound { .. } => Code::NotFound,
            DatastoreError::AlreadyExists { .. } => Code::AlreadyExists,
            DatastoreError::InvalidArgument(_) | DatastoreError::InvalidCursor(_) => {
                Code::InvalidArgument
            }
            DatastoreError::Transient(_) => Code::Unavailable,
            DatastoreError::Serialization(_)
            | DatastoreError::Backend(_)
            | DatastoreError::Config(_) => Code::Internal,
        };
        Status::new(code, err.to_string())
    }
}

/// 数据存储结果类型别名
pub type DatastoreResult<T> = Result<T, DatastoreError>;
