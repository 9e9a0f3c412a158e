//! 统一配置管理
//!
//! fleetd 所有配置项的定义、文档、默认值都在这里统一管理。配置文件使用 TOML 格式。

pub mod inventory;
pub mod karte;
pub mod services;
pub mod tracing;
pub mod ufs;
pub mod weetbix;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::inventory::{InventoryConfig, InventoryStoreKind};
pub use crate::config::karte::{
    KarteConfig, KartePersistConfig, MAX_PERSIST_INTERVAL_SECS, MAX_SEAL_DURATION_SECS,
};
pub use crate::config::services::ServicesConfig;
pub use crate::config::tracing::TracingConfig;
pub use crate::config::ufs::UfsConfig;
pub use crate::config::weetbix::WeetbixConfig;
pub use crate::storage::{DatastoreBackendKind, DatastoreConfig};

use crate::error::ConfigError;

// 服务启用标志位常量
pub const ENABLE_KARTE: u8 = 0b0001;
pub const ENABLE_WEETBIX: u8 = 0b0010;
pub const ENABLE_UFS: u8 = 0b0100;
pub const ENABLE_INVENTORY: u8 = 0b1000;
const ENABLE_ALL: u8 = ENABLE_KARTE | ENABLE_WEETBIX | ENABLE_UFS | ENABLE_INVENTORY;

/// fleetd 主配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FleetConfig {
    /// Service enable flags (bitmask)
    ///
    /// Bit positions:
    /// - Bit 0 (1): Karte
    /// - Bit 1 (2): Weetbix
    /// - Bit 2 (4): UFS
    /// - Bit 3 (8): Inventory
    ///
    /// `enable = 15` enables all services.
    #[serde(default = "default_enable")]
    pub enable: u8,

    /// 实例名称，用于日志与追踪中区分节点
    pub name: String,

    /// 运行环境：dev / prod / test
    pub env: String,

    /// 网络绑定配置
    #[serde(default)]
    pub bind: BindConfig,

    /// 数据存储配置
    #[serde(default)]
    pub datastore: DatastoreConfig,

    /// 各服务配置
    #[serde(default)]
    pub services: ServicesConfig,

    /// 可观测性配置（日志 + 追踪）
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// 启动时写入数据存储的 realm 授权，对应 `[[grants]]`
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

/// 一条 realm 授权
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GrantConfig {
    /// 全局 realm 名，例如 `chromium:@root`
    pub realm: String,
    /// 身份，例如 `user:someone@example.com` 或 `group:all`
    pub identity: String,
    pub permission: String,
}

/// 网络绑定配置
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BindConfig {
    #[serde(default)]
    pub http: HttpBindConfig,
}

/// HTTP 服务绑定配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpBindConfig {
    /// 绑定 IP 地址，通常使用 "0.0.0.0" 监听所有接口
    pub ip: String,

    /// 绑定端口
    pub port: u16,
}

impl Default for HttpBindConfig {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObservabilityConfig {
    /// 过滤级别（用于日志与追踪）
    ///
    /// 支持 EnvFilter 语法（如 "info,sqlx=warn"）。`RUST_LOG` 优先。
    #[serde(default = "default_filter_level")]
    pub filter_level: String,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub tracing: TracingConfig,
}

/// 日志配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// 日志输出目标："console"（默认）或 "file"
    #[serde(default = "default_log_output")]
    pub output: String,

    /// 按天轮转日志文件（output = "file" 时有效）
    #[serde(default)]
    pub rotate: bool,

    /// 日志目录（output = "file" 时有效）
    #[serde(default = "default_log_path")]
    pub path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter_level: default_filter_level(),
            log: LogConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: default_log_output(),
            rotate: false,
            path: default_log_path(),
        }
    }
}

fn default_enable() -> u8 {
    ENABLE_ALL
}

fn default_log_output() -> String {
    "console".to_string()
}

fn default_log_path() -> String {
    "logs/".to_string()
}

fn default_filter_level() -> String {
    "info".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            name: "fleetd-default".to_string(),
            env: "dev".to_string(),
            bind: BindConfig::default(),
            datastore: DatastoreConfig::default(),
            services: ServicesConfig::default(),
            observability: ObservabilityConfig::default(),
            grants: Vec::new(),
        }
    }
}

impl FleetConfig {
    pub fn is_karte_enabled(&self) -> bool {
        self.enable & ENABLE_KARTE != 0
    }

    pub fn is_weetbix_enabled(&self) -> bool {
        self.enable & ENABLE_WEETBIX != 0
    }

    pub fn is_ufs_enabled(&self) -> bool {
        self.enable & ENABLE_UFS != 0
    }

    pub fn is_inventory_enabled(&self) -> bool {
        self.enable & ENABLE_INVENTORY != 0
    }

    /// Karte 配置，未配置时使用默认值
    pub fn karte_config(&self) -> KarteConfig {
        self.services.karte.clone().unwrap_or_default()
    }

    pub fn weetbix_config(&self) -> WeetbixConfig {
        self.services.weetbix.clone().unwrap_or_default()
    }

    pub fn ufs_config(&self) -> UfsConfig {
        self.services.ufs.clone().unwrap_or_default()
    }

    pub fn inventory_config(&self) -> InventoryConfig {
        self.services.inventory.clone().unwrap_or_default()
    }

    /// 返回可观测性配置引用
    pub fn observability_config(&self) -> &ObservabilityConfig {
        &self.observability
    }

    /// 返回追踪配置引用
    pub fn tracing_config(&self) -> &TracingConfig {
        &self.observability.tracing
    }

    /// HTTP 监听地址
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.bind.http.ip, self.bind.http.port)
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::FileNotFound {
                path: path_ref.display().to_string(),
            });
        }

        if !path_ref.is_file() {
            return Err(ConfigError::NotAFile {
                path: path_ref.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path_ref)?;
        Ok(Self::from_toml(&content)?)
    }

    /// 从 TOML 字符串加载配置
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 验证配置有效性
    ///
    /// 一次返回所有问题。以 `Warning:` 开头的条目不影响启动。
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.enable > ENABLE_ALL {
            errors.push(format!(
                "Invalid enable bitmask value: {}. Must be between 0 and {ENABLE_ALL} (4 bits)",
                self.enable
            ));
        }
        if self.enable == 0 {
            errors.push("Warning: no service is enabled (enable = 0)".to_string());
        }

        if self.name.trim().is_empty() {
            errors.push("Instance name cannot be empty".to_string());
        }

        if !["dev", "prod", "test"].contains(&self.env.as_str()) {
            errors.push(format!(
                "Invalid environment '{}', must be one of: dev, prod, test",
                self.env
            ));
        }

        if self.bind.http.ip.parse::<std::net::IpAddr>().is_err() {
            errors.push(format!(
                "Invalid bind.http.ip '{}', must be a valid IP address",
                self.bind.http.ip
            ));
        }

        // 验证过滤级别（EnvFilter 语法）
        let main_level = self
            .observability
            .filter_level
            .split(',')
            .next()
            .unwrap_or("")
            .trim();
        if !["trace", "debug", "info", "warn", "error"].contains(&main_level) {
            errors.push(format!(
                "Invalid filter level '{}', must start with one of: trace, debug, info, warn, error",
                self.observability.filter_level
            ));
        }

        if !["console", "file"].contains(&self.observability.log.output.as_str()) {
            errors.push(format!(
                "Invalid log output '{}' (observability.log.output), must be 'console' or 'file'",
                self.observability.log.output
            ));
        }

        if let Err(e) = self.observability.tracing.validate() {
            errors.push(format!("Tracing configuration error: {e}"));
        }

        if self.datastore.backend == DatastoreBackendKind::Sqlite
            && self.datastore.sqlite_path.as_os_str().is_empty()
        {
            errors.push("datastore.sqlite_path cannot be empty".to_string());
        }
        if let Err(e) = self.datastore.retry.validate() {
            errors.push(format!("Datastore retry configuration error: {e}"));
        }

        if self.is_karte_enabled() {
            let karte = self.karte_config();
            if karte.seal_duration_secs == 0 || karte.seal_duration_secs > MAX_SEAL_DURATION_SECS {
                errors.push(format!(
                    "services.karte.seal_duration_secs ({}) must be within 1..={MAX_SEAL_DURATION_SECS}",
                    karte.seal_duration_secs
                ));
            }
            if karte.persist.enable
                && (karte.persist.interval_secs == 0
                    || karte.persist.interval_secs > MAX_PERSIST_INTERVAL_SECS)
            {
                errors.push(format!(
                    "services.karte.persist.interval_secs ({}) must be within 1..={MAX_PERSIST_INTERVAL_SECS}",
                    karte.persist.interval_secs
                ));
            }
        }

        if self.is_ufs_enabled() {
            let ufs = self.ufs_config();
            if ufs.default_page_size == 0 || ufs.default_page_size > ufs.max_page_size {
                errors.push(format!(
                    "services.ufs.default_page_size ({}) must be within 1..={}",
                    ufs.default_page_size, ufs.max_page_size
                ));
            }
        }

        if self.is_inventory_enabled() {
            let inventory = self.inventory_config();
            if inventory.store == InventoryStoreKind::File && inventory.path.trim().is_empty() {
                errors.push("services.inventory.path is required when store = \"file\"".to_string());
            }
            if inventory.critical_pools.contains(&inventory.spare_pool) {
                errors.push(format!(
                    "services.inventory.spare_pool '{}' cannot also be a critical pool",
                    inventory.spare_pool
                ));
            }
        }

        for (i, grant) in self.grants.iter().enumerate() {
            if let Err(e) = crate::realm::validate_realm(&grant.realm) {
                errors.push(format!("grants[{i}].realm: {e}"));
            }
            if !grant.identity.contains(':') {
                errors.push(format!(
                    "grants[{i}].identity '{}' must be of the form kind:value",
                    grant.identity
                ));
            }
            if grant.permission.trim().is_empty() {
                errors.push(format!("grants[{i}].permission cannot be empty"));
            }
        }

        if self.env == "prod" {
            if self.datastore.backend == DatastoreBackendKind::Memory {
                errors.push("Production environment must not use the memory datastore".to_string());
            }
            if self.observability.log.output != "file" {
                errors.push("Warning: Production environment should use file logging (observability.log.output = \"file\")".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 过滤掉警告后的致命错误
    pub fn fatal_errors(errors: &[String]) -> Vec<&String> {
        errors.iter().filter(|e| !e.starts_with("Warning:")).collect()
    }
}
