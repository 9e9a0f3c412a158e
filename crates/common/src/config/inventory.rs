//! Inventory 服务配置

use serde::{Deserialize, Serialize};

fn default_inventory_path() -> String {
    "inventory/lab.json".to_string()
}

fn default_spare_pool() -> String {
    "DUT_POOL_SUITES".to_string()
}

fn default_critical_pools() -> Vec<String> {
    vec!["DUT_POOL_CQ".to_string(), "DUT_POOL_BVT".to_string()]
}

/// Inventory 存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InventoryStoreKind {
    /// JSON 文件
    #[default]
    File,
    /// 进程内存
    Memory,
}

/// Inventory 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// 库存数据存储方式
    #[serde(default)]
    pub store: InventoryStoreKind,

    /// 库存 JSON 文件路径（store = "file" 时使用）
    #[serde(default = "default_inventory_path")]
    pub path: String,

    /// 备用池名称，BalancePools 从这里补充健康的 DUT
    #[serde(default = "default_spare_pool")]
    pub spare_pool: String,

    /// 需要保持健康的关键池
    #[serde(default = "default_critical_pools")]
    pub critical_pools: Vec<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            store: InventoryStoreKind::default(),
            path: default_inventory_path(),
            spare_pool: default_spare_pool(),
            critical_pools: default_critical_pools(),
        }
    }
}
