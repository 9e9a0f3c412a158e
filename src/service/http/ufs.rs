//! UFS HTTP 服务实现

use crate::service::{HttpRouterService, ServiceType, info::ServiceInfo};
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use fleet_common::Datastore;
use fleet_common::config::UfsConfig;
use tracing::info;
use ufs::{create_router, create_ufs_state};

#[derive(Debug)]
pub struct UfsHttpService {
    info: ServiceInfo,
    config: UfsConfig,
    store: Datastore,
}

impl UfsHttpService {
    pub fn new(config: UfsConfig, store: Datastore) -> Self {
        Self {
            info: ServiceInfo::new(
                "UFS Service",
                ServiceType::Ufs,
                &[fleet_proto::ufs::SERVICE_NAME],
                Some("机器、机架与资产登记".to_string()),
            ),
            config,
            store,
        }
    }
}

#[async_trait]
impl HttpRouterService for UfsHttpService {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ServiceInfo {
        &mut self.info
    }

    async fn build_router(&mut self) -> Result<Router> {
        info!("Building UFS router");
        Ok(create_router(create_ufs_state(self.store.clone(), &self.config)))
    }
}
