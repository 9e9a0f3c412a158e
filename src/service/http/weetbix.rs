//! Weetbix HTTP 服务实现

use crate::service::{HttpRouterService, ServiceType, info::ServiceInfo};
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use fleet_common::Datastore;
use fleet_common::config::WeetbixConfig;
use fleet_proto::weetbix::{CLUSTERS_SERVICE, PROJECTS_SERVICE, RULES_SERVICE, TEST_HISTORY_SERVICE};
use tracing::info;
use weetbix::{create_router, create_weetbix_state};

#[derive(Debug)]
pub struct WeetbixHttpService {
    info: ServiceInfo,
    config: WeetbixConfig,
    store: Datastore,
}

impl WeetbixHttpService {
    pub fn new(config: WeetbixConfig, store: Datastore) -> Self {
        Self {
            info: ServiceInfo::new(
                "Weetbix Service",
                ServiceType::Weetbix,
                &[
                    RULES_SERVICE,
                    CLUSTERS_SERVICE,
                    PROJECTS_SERVICE,
                    TEST_HISTORY_SERVICE,
                ],
                Some("测试失败聚类与关联规则".to_string()),
            ),
            config,
            store,
        }
    }
}

#[async_trait]
impl HttpRouterService for WeetbixHttpService {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ServiceInfo {
        &mut self.info
    }

    async fn build_router(&mut self) -> Result<Router> {
        info!("Building Weetbix router");
        let state = create_weetbix_state(self.store.clone(), &self.config);
        Ok(create_router(state))
    }
}
