//! 错误处理模块
//!
//! 按概念分离的错误类型定义，遵循一个文件一个核心概念的原则

mod base_error;
mod config_error;
mod datastore_error;

pub use base_error::{BaseError, Result};
pub use config_error::ConfigError;
pub use datastore_error::{DatastoreError, DatastoreResult};
