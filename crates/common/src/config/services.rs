//! 服务配置集合

use super::inventory::InventoryConfig;
use super::karte::KarteConfig;
use super::ufs::UfsConfig;
use super::weetbix::WeetbixConfig;
use serde::{Deserialize, Serialize};

/// 所有服务的配置集合
///
/// 缺省的服务段使用默认配置；服务是否启用由顶层 `enable` 位掩码决定。
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub karte: Option<KarteConfig>,

    #[serde(default)]
    pub weetbix: Option<WeetbixConfig>,

    #[serde(default)]
    pub ufs: Option<UfsConfig>,

    #[serde(default)]
    pub inventory: Option<InventoryConfig>,
}
