//! Inventory pRPC 处理器

use std::sync::Arc;

use axum::{Router, extract::State, routing::post};
use fleet_common::config::InventoryConfig;
use fleet_common::prpc::{PrpcRequest, PrpcResult, handle, method_path};
use fleet_common::{Caller, Datastore};
use fleet_proto::inventory::{
    AssignDutsToDronesRequest, AssignDutsToDronesResponse, BalancePoolsRequest,
    BalancePoolsResponse, DeleteDutsRequest, DeleteDutsResponse, DutState, GetDutInfoRequest,
    GetDutInfoResponse, ListDutsRequest, ListDutsResponse, ListServersRequest,
    ListServersResponse, RemoveDutsFromDronesRequest, RemoveDutsFromDronesResponse,
    ResizePoolRequest, ResizePoolResponse, SERVICE_NAME, UpdateDutStateRequest,
};
use tonic::Status;
use tracing::info;

use crate::service::InventoryService;
use crate::store::{InventoryStore, open_store};

/// Inventory 服务状态
#[derive(Clone, Debug)]
pub struct InventoryState {
    pub service: InventoryService,
}

impl InventoryState {
    pub fn new(service: InventoryService) -> Self {
        Self { service }
    }
}

/// 按配置打开库存存储并创建服务状态；DUT 状态保存在 `datastore` 中
pub fn create_inventory_state(datastore: Datastore, config: &InventoryConfig) -> InventoryState {
    let store: Arc<dyn InventoryStore> = open_store(config);
    info!(
        store = ?config.store,
        path = %config.path,
        spare_pool = %config.spare_pool,
        "Initializing Inventory state"
    );
    InventoryState::new(InventoryService::new(store, datastore, config.clone()))
}

pub fn create_router(state: InventoryState) -> Router {
    Router::new()
        .route(&method_path(SERVICE_NAME, "ResizePool"), post(resize_pool))
        .route(&method_path(SERVICE_NAME, "BalancePools"), post(balance_pools))
        .route(&method_path(SERVICE_NAME, "AssignDutsToDrones"), post(assign_duts_to_drones))
        .route(&method_path(SERVICE_NAME, "RemoveDutsFromDrones"), post(remove_duts_from_drones))
        .route(&method_path(SERVICE_NAME, "ListServers"), post(list_servers))
        .route(&method_path(SERVICE_NAME, "GetDutInfo"), post(get_dut_info))
        .route(&method_path(SERVICE_NAME, "ListDuts"), post(list_duts))
        .route(&method_path(SERVICE_NAME, "DeleteDuts"), post(delete_duts))
        .route(&method_path(SERVICE_NAME, "UpdateDutState"), post(update_dut_state))
        .with_state(state)
}

async fn resize_pool(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ResizePoolRequest>,
) -> PrpcResult<ResizePoolResponse> {
    handle(SERVICE_NAME, "ResizePool", async move {
        state.service.resize_pool(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn balance_pools(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<BalancePoolsRequest>,
) -> PrpcResult<BalancePoolsResponse> {
    handle(SERVICE_NAME, "BalancePools", async move {
        state.service.balance_pools(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn assign_duts_to_drones(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<AssignDutsToDronesRequest>,
) -> PrpcResult<AssignDutsToDronesResponse> {
    handle(SERVICE_NAME, "AssignDutsToDrones", async move {
        state.service.assign_duts_to_drones(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn remove_duts_from_drones(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<RemoveDutsFromDronesRequest>,
) -> PrpcResult<RemoveDutsFromDronesResponse> {
    handle(SERVICE_NAME, "RemoveDutsFromDrones", async move {
        state.service.remove_duts_from_drones(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn list_servers(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListServersRequest>,
) -> PrpcResult<ListServersResponse> {
    handle(SERVICE_NAME, "ListServers", async move {
        state.service.list_servers(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn get_dut_info(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<GetDutInfoRequest>,
) -> PrpcResult<GetDutInfoResponse> {
    handle(SERVICE_NAME, "GetDutInfo", async move {
        state.service.get_dut_info(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn list_duts(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListDutsRequest>,
) -> PrpcResult<ListDutsResponse> {
    handle(SERVICE_NAME, "ListDuts", async move {
        state.service.list_duts(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn delete_duts(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<DeleteDutsRequest>,
) -> PrpcResult<DeleteDutsResponse> {
    handle(SERVICE_NAME, "DeleteDuts", async move {
        state.service.delete_duts(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn update_dut_state(
    State(state): State<InventoryState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<UpdateDutStateRequest>,
) -> PrpcResult<DutState> {
    handle(SERVICE_NAME, "UpdateDutState", async move {
        state.service.update_dut_state(&caller, req).await.map_err(Status::from)
    })
    .await
}
