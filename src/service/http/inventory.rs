//! Inventory HTTP 服务实现
//!
//! 库存文档按 `services.inventory.store` 打开；DUT 状态保存在共享数据存储中

use crate::service::{HttpRouterService, ServiceType, info::ServiceInfo};
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use fleet_common::Datastore;
use fleet_common::config::{InventoryConfig, InventoryStoreKind};
use inventory::{create_inventory_state, create_router};
use tracing::{info, warn};

#[derive(Debug)]
pub struct InventoryHttpService {
    info: ServiceInfo,
    config: InventoryConfig,
    store: Datastore,
}

impl InventoryHttpService {
    pub fn new(config: InventoryConfig, store: Datastore) -> Self {
        Self {
            info: ServiceInfo::new(
                "Inventory Service",
                ServiceType::Inventory,
                &[fleet_proto::inventory::SERVICE_NAME],
                Some("实验室库存、DUT 资源池与 drone 分配".to_string()),
            ),
            config,
            store,
        }
    }
}

#[async_trait]
impl HttpRouterService for InventoryHttpService {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ServiceInfo {
        &mut self.info
    }

    async fn build_router(&mut self) -> Result<Router> {
        match self.config.store {
            InventoryStoreKind::File => info!(path = %self.config.path, "Building Inventory router"),
            InventoryStoreKind::Memory => {
                warn!("Inventory uses the memory store, changes are lost on restart")
            }
        }
        Ok(create_router(create_inventory_state(
            self.store.clone(),
            &self.config,
        )))
    }
}
