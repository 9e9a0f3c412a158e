//! 数据存储配置

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::retry::RetryPolicy;

/// 数据存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// 存储后端类型
    #[serde(default)]
    pub backend: DatastoreBackendKind,

    /// SQLite 数据库文件存储目录（当 backend = "sqlite" 时使用）
    ///
    /// 数据库文件为 `{sqlite_path}/fleet.db`，目录不存在时自动创建。
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// 临时错误的重试策略
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("database")
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            backend: DatastoreBackendKind::default(),
            sqlite_path: default_sqlite_path(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DatastoreConfig {
    /// 内存后端配置，用于测试
    pub fn memory() -> Self {
        Self {
            backend: DatastoreBackendKind::Memory,
            ..Self::default()
        }
    }
}

/// 存储后端类型枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreBackendKind {
    /// SQLite 数据库
    #[default]
    Sqlite,
    /// 进程内存
    Memory,
}
