//! UFS 服务配置

use serde::{Deserialize, Serialize};

use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

/// UFS 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UfsConfig {
    /// List 请求未指定 page_size 时的默认值
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// List 请求的 page_size 上限
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for UfsConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}
