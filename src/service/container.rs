//! 服务容器模块 - 封装不同类型的服务

use super::HttpRouterService;
use super::{InventoryHttpService, KarteHttpService, UfsHttpService, WeetbixHttpService};
use crate::service::info::ServiceInfo;
use axum::Router;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

/// 服务容器，用于封装不同类型的服务
#[derive(Debug)]
pub enum ServiceContainer {
    Karte(KarteHttpService),
    Weetbix(WeetbixHttpService),
    Ufs(UfsHttpService),
    Inventory(InventoryHttpService),
}

impl ServiceContainer {
    pub fn karte(service: KarteHttpService) -> Self {
        Self::Karte(service)
    }

    pub fn weetbix(service: WeetbixHttpService) -> Self {
        Self::Weetbix(service)
    }

    pub fn ufs(service: UfsHttpService) -> Self {
        Self::Ufs(service)
    }

    pub fn inventory(service: InventoryHttpService) -> Self {
        Self::Inventory(service)
    }

    fn service(&self) -> &dyn HttpRouterService {
        match self {
            ServiceContainer::Karte(s) => s,
            ServiceContainer::Weetbix(s) => s,
            ServiceContainer::Ufs(s) => s,
            ServiceContainer::Inventory(s) => s,
        }
    }

    fn service_mut(&mut self) -> &mut dyn HttpRouterService {
        match self {
            ServiceContainer::Karte(s) => s,
            ServiceContainer::Weetbix(s) => s,
            ServiceContainer::Ufs(s) => s,
            ServiceContainer::Inventory(s) => s,
        }
    }

    pub fn info(&self) -> &ServiceInfo {
        self.service().info()
    }

    pub async fn build_router(&mut self) -> anyhow::Result<Router> {
        self.service_mut().build_router().await
    }

    pub fn spawn_background(&self, shutdown_rx: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        self.service().spawn_background(shutdown_rx)
    }

    pub async fn on_start(&mut self, base_url: Url) -> anyhow::Result<()> {
        self.service_mut().on_start(base_url).await
    }

    pub async fn on_stop(&mut self) -> anyhow::Result<()> {
        self.service_mut().on_stop().await
    }
}
