//! Karte 服务配置

use serde::{Deserialize, Serialize};

/// 封存时长上限：十年
pub const MAX_SEAL_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// 导出间隔上限：一天
pub const MAX_PERSIST_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn default_seal_duration_secs() -> u64 {
    12 * 60 * 60
}

fn default_persist_interval_secs() -> u64 {
    10 * 60
}

fn default_export_path() -> String {
    "karte-export".to_string()
}

/// Karte 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KarteConfig {
    /// Action 的封存时长（秒）
    ///
    /// Action 在 `create_time + seal_duration` 之后不再接受更新，随后被导出。
    /// 默认 12 小时。
    #[serde(default = "default_seal_duration_secs")]
    pub seal_duration_secs: u64,

    /// 定期导出配置
    #[serde(default)]
    pub persist: KartePersistConfig,
}

impl Default for KarteConfig {
    fn default() -> Self {
        Self {
            seal_duration_secs: default_seal_duration_secs(),
            persist: KartePersistConfig::default(),
        }
    }
}

/// 定期导出已封存 Action 的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KartePersistConfig {
    /// 是否启用后台定期导出
    #[serde(default)]
    pub enable: bool,

    /// 导出间隔（秒）
    #[serde(default = "default_persist_interval_secs")]
    pub interval_secs: u64,

    /// NDJSON 导出目录，每张表一个文件
    #[serde(default = "default_export_path")]
    pub output_path: String,
}

impl Default for KartePersistConfig {
    fn default() -> Self {
        Self {
            enable: false,
            interval_secs: default_persist_interval_secs(),
            output_path: default_export_path(),
        }
    }
}
