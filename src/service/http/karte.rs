//! Karte HTTP 服务实现
//!
//! 除了 pRPC 路由外，启用 `persist` 时还负责后台定期导出已封存的 action

use crate::service::{HttpRouterService, ServiceType, info::ServiceInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use fleet_common::Datastore;
use fleet_common::config::KarteConfig;
use karte::{KarteState, create_karte_state, create_router, persist_loop};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct KarteHttpService {
    info: ServiceInfo,
    config: KarteConfig,
    store: Datastore,
    state: Option<KarteState>,
}

impl KarteHttpService {
    pub fn new(config: KarteConfig, store: Datastore) -> Self {
        Self {
            info: ServiceInfo::new(
                "Karte Service",
                ServiceType::Karte,
                &[fleet_proto::karte::SERVICE_NAME],
                Some("设备操作与观测记录".to_string()),
            ),
            config,
            store,
            state: None,
        }
    }
}

#[async_trait]
impl HttpRouterService for KarteHttpService {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ServiceInfo {
        &mut self.info
    }

    async fn build_router(&mut self) -> Result<Router> {
        info!("Building Karte router");
        let state = create_karte_state(self.store.clone(), &self.config);
        self.state = Some(state.clone());
        Ok(create_router(state))
    }

    /// 启用定期导出时先确认导出目录可用
    async fn on_start(&mut self, base_url: Url) -> Result<()> {
        if self.config.persist.enable {
            let dir = &self.config.persist.output_path;
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Karte export directory {dir:?} is not usable"))?;
        }
        self.info_mut().set_running(base_url);
        Ok(())
    }

    fn spawn_background(&self, shutdown_rx: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        if !self.config.persist.enable {
            info!("Karte periodic persist is disabled");
            return None;
        }
        let service = self.state.as_ref()?.service.clone();
        Some(tokio::spawn(persist_loop(
            service,
            self.config.persist.clone(),
            shutdown_rx,
        )))
    }
}
