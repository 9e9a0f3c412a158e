//! 服务信息管理模块

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use super::ServiceType;

/// 服务运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Running,
    Stopped,
}

/// 服务基本信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// 服务名称
    pub name: String,
    pub service_type: ServiceType,
    /// pRPC 服务名，例如 `ufs.Fleet`
    pub prpc_services: Vec<String>,
    pub status: ServiceStatus,
    /// 服务对外地址，启动后设置
    pub base_url: Option<Url>,
    /// 服务描述
    pub description: Option<String>,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        service_type: ServiceType,
        prpc_services: &[&str],
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_type,
            prpc_services: prpc_services.iter().map(|s| s.to_string()).collect(),
            status: ServiceStatus::Unknown,
            base_url: None,
            description,
        }
    }

    pub fn set_running(&mut self, base_url: Url) {
        self.base_url = Some(base_url);
        self.status = ServiceStatus::Running;
    }

    pub fn set_stopped(&mut self) {
        self.status = ServiceStatus::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }
}

/// 已启动服务的信息表，供 `/health` 查询
#[derive(Debug, Clone, Default)]
pub struct ServiceCollector {
    services: Arc<RwLock<BTreeMap<String, ServiceInfo>>>,
}

impl ServiceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, name: String, info: ServiceInfo) {
        self.services.write().await.insert(name, info);
    }

    /// 按名称排序的服务信息
    pub async fn values(&self) -> Vec<ServiceInfo> {
        self.services.read().await.values().cloned().collect()
    }

    pub async fn mark_all_stopped(&self) {
        for info in self.services.write().await.values_mut() {
            info.set_stopped();
        }
    }
}
