//! Weetbix 服务配置

use serde::{Deserialize, Serialize};

fn default_max_cluster_request() -> usize {
    1000
}

fn default_max_batch_get() -> usize {
    1000
}

/// Weetbix 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeetbixConfig {
    /// Clusters.Cluster 单次请求最多的测试结果数
    #[serde(default = "default_max_cluster_request")]
    pub max_cluster_request_size: usize,

    /// Clusters.BatchGet 单次请求最多的 cluster 数
    #[serde(default = "default_max_batch_get")]
    pub max_batch_get_size: usize,
}

impl Default for WeetbixConfig {
    fn default() -> Self {
        Self {
            max_cluster_request_size: default_max_cluster_request(),
            max_batch_get_size: default_max_batch_get(),
        }
    }
}
