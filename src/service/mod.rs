//! 服务管理模块
//!
//! 每个业务服务（Karte、Weetbix、UFS、Inventory）提供一个 axum 路由器，
//! 由 `ServiceManager` 合并到同一个 HTTP 服务器上。
//!
//! ## 核心概念
//!
//! - `HttpRouterService`: 业务服务的核心 trait，提供 pRPC 路由器和可选的后台任务
//! - `ServiceInfo`: 服务的基本信息
//! - `ServiceManager`: 服务管理器，负责服务的启动与关闭

pub mod container;
pub mod http;
pub mod info;
pub mod manager;
pub mod trace;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use info::ServiceInfo;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use strum::Display;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

pub use http::{InventoryHttpService, KarteHttpService, UfsHttpService, WeetbixHttpService};

pub use container::ServiceContainer;
pub use info::{ServiceCollector, ServiceStatus};
pub use manager::ServiceManager;

/// 服务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
pub enum ServiceType {
    Karte,
    Weetbix,
    Ufs,
    Inventory,
}

/// 业务服务的核心 trait - 为 axum 提供路由器
#[async_trait]
pub trait HttpRouterService: Send + Sync + Debug {
    fn info(&self) -> &ServiceInfo;

    fn info_mut(&mut self) -> &mut ServiceInfo;

    /// 构建 pRPC 路由器，路径均为 `/prpc/{service}/{method}`
    async fn build_router(&mut self) -> Result<Router>;

    /// 启动后台任务，收到关闭信号后退出。需在 `build_router` 之后调用
    fn spawn_background(&self, _shutdown_rx: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        None
    }

    /// 服务启动回调（路由器已挂载到服务器后调用）
    async fn on_start(&mut self, base_url: Url) -> Result<()> {
        self.info_mut().set_running(base_url);
        Ok(())
    }

    /// 服务停止回调
    async fn on_stop(&mut self) -> Result<()> {
        info!("Service '{}' stopped", self.info().name);
        self.info_mut().set_stopped();
        Ok(())
    }
}
