//! 统一错误处理模型
//!
//! fleetd 主程序的顶层错误类型，聚合配置、数据存储和各服务启动阶段的错误

use fleet_common::error::{BaseError, ConfigError, DatastoreError};
use thiserror::Error;

/// 主程序的统一错误枚举
#[derive(Debug, Error)]
pub enum Error {
    // ========== 配置相关错误 ==========
    /// 配置文件加载或解析失败
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // ========== 基础库错误 ==========
    #[error("Base library error: {0}")]
    Base(Box<BaseError>),

    /// 数据存储初始化失败
    #[error("Datastore error: {0}")]
    Datastore(#[from] DatastoreError),

    // ========== 系统级错误 ==========
    /// I/O 操作错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 后台任务异常退出
    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),

    // ========== 业务逻辑错误 ==========
    /// 服务启动失败
    #[error("Service startup failed: {message}")]
    ServiceStartup { message: String },

    /// 服务配置验证失败
    #[error("Service configuration validation failed: {message}")]
    ServiceValidation { message: String },

    // ========== 通用错误 ==========
    /// Anyhow 错误兼容层
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    /// 自定义错误消息
    #[error("Application error: {message}")]
    Custom { message: String },
}

impl From<BaseError> for Error {
    fn from(err: BaseError) -> Self {
        Error::Base(Box::new(err))
    }
}

/// 主程序的 Result 类型
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    pub fn service_startup(message: impl Into<String>) -> Self {
        Self::ServiceStartup {
            message: message.into(),
        }
    }

    pub fn service_validation(message: impl Into<String>) -> Self {
        Self::ServiceValidation {
            message: message.into(),
        }
    }
}
