//! UFS pRPC 处理器

use axum::{Router, extract::State, routing::post};
use fleet_common::config::UfsConfig;
use fleet_common::prpc::{PrpcRequest, PrpcResult, handle, method_path};
use fleet_common::{Caller, Datastore};
use fleet_proto::Empty;
use fleet_proto::ufs::{
    Asset, BatchGetAssetsResponse, BatchGetMachinesResponse, BatchGetRacksResponse,
    BatchGetRequest, CreateAssetRequest, CreateMachineRequest, CreateRackRequest,
    ListAssetsResponse, ListMachinesResponse, ListRacksResponse, ListRequest, Machine, NameRequest,
    Rack, SERVICE_NAME, UpdateAssetRequest, UpdateMachineOwnershipRequest, UpdateMachineRequest,
    UpdateRackRequest,
};
use tonic::Status;
use tracing::info;

use crate::service::FleetService;

/// UFS 服务状态
#[derive(Clone, Debug)]
pub struct UfsState {
    pub service: FleetService,
}

impl UfsState {
    pub fn new(service: FleetService) -> Self {
        Self { service }
    }
}

pub fn create_ufs_state(store: Datastore, config: &UfsConfig) -> UfsState {
    info!(
        default_page_size = config.default_page_size,
        max_page_size = config.max_page_size,
        "Initializing UFS state"
    );
    UfsState::new(FleetService::new(store, config.clone()))
}

/// 创建 UFS 路由，所有方法都在 `ufs.Fleet` 服务下
pub fn create_router(state: UfsState) -> Router {
    Router::new()
        .route(&method_path(SERVICE_NAME, "CreateMachine"), post(create_machine))
        .route(&method_path(SERVICE_NAME, "UpdateMachine"), post(update_machine))
        .route(&method_path(SERVICE_NAME, "UpdateMachineOwnership"), post(update_machine_ownership))
        .route(&method_path(SERVICE_NAME, "GetMachine"), post(get_machine))
        .route(&method_path(SERVICE_NAME, "BatchGetMachines"), post(batch_get_machines))
        .route(&method_path(SERVICE_NAME, "ListMachines"), post(list_machines))
        .route(&method_path(SERVICE_NAME, "DeleteMachine"), post(delete_machine))
        .route(&method_path(SERVICE_NAME, "CreateRack"), post(create_rack))
        .route(&method_path(SERVICE_NAME, "UpdateRack"), post(update_rack))
        .route(&method_path(SERVICE_NAME, "GetRack"), post(get_rack))
        .route(&method_path(SERVICE_NAME, "BatchGetRacks"), post(batch_get_racks))
        .route(&method_path(SERVICE_NAME, "ListRacks"), post(list_racks))
        .route(&method_path(SERVICE_NAME, "DeleteRack"), post(delete_rack))
        .route(&method_path(SERVICE_NAME, "CreateAsset"), post(create_asset))
        .route(&method_path(SERVICE_NAME, "UpdateAsset"), post(update_asset))
        .route(&method_path(SERVICE_NAME, "GetAsset"), post(get_asset))
        .route(&method_path(SERVICE_NAME, "BatchGetAssets"), post(batch_get_assets))
        .route(&method_path(SERVICE_NAME, "ListAssets"), post(list_assets))
        .route(&method_path(SERVICE_NAME, "DeleteAsset"), post(delete_asset))
        .with_state(state)
}

async fn create_machine(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<CreateMachineRequest>,
) -> PrpcResult<Machine> {
    handle(SERVICE_NAME, "CreateMachine", async move {
        state.service.create_machine(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn update_machine(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<UpdateMachineRequest>,
) -> PrpcResult<Machine> {
    handle(SERVICE_NAME, "UpdateMachine", async move {
        state.service.update_machine(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn update_machine_ownership(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<UpdateMachineOwnershipRequest>,
) -> PrpcResult<Machine> {
    handle(SERVICE_NAME, "UpdateMachineOwnership", async move {
        state.service.update_machine_ownership(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn get_machine(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<NameRequest>,
) -> PrpcResult<Machine> {
    handle(SERVICE_NAME, "GetMachine", async move {
        state.service.get_machine(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn batch_get_machines(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<BatchGetRequest>,
) -> PrpcResult<BatchGetMachinesResponse> {
    handle(SERVICE_NAME, "BatchGetMachines", async move {
        state.service.batch_get_machines(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn list_machines(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListRequest>,
) -> PrpcResult<ListMachinesResponse> {
    handle(SERVICE_NAME, "ListMachines", async move {
        state.service.list_machines(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn delete_machine(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<NameRequest>,
) -> PrpcResult<Empty> {
    handle(SERVICE_NAME, "DeleteMachine", async move {
        state.service.delete_machine(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn create_rack(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<CreateRackRequest>,
) -> PrpcResult<Rack> {
    handle(SERVICE_NAME, "CreateRack", async move {
        state.service.create_rack(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn update_rack(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<UpdateRackRequest>,
) -> PrpcResult<Rack> {
    handle(SERVICE_NAME, "UpdateRack", async move {
        state.service.update_rack(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn get_rack(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<NameRequest>,
) -> PrpcResult<Rack> {
    handle(SERVICE_NAME, "GetRack", async move {
        state.service.get_rack(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn batch_get_racks(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<BatchGetRequest>,
) -> PrpcResult<BatchGetRacksResponse> {
    handle(SERVICE_NAME, "BatchGetRacks", async move {
        state.service.batch_get_racks(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn list_racks(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListRequest>,
) -> PrpcResult<ListRacksResponse> {
    handle(SERVICE_NAME, "ListRacks", async move {
        state.service.list_racks(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn delete_rack(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<NameRequest>,
) -> PrpcResult<Empty> {
    handle(SERVICE_NAME, "DeleteRack", async move {
        state.service.delete_rack(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn create_asset(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<CreateAssetRequest>,
) -> PrpcResult<Asset> {
    handle(SERVICE_NAME, "CreateAsset", async move {
        state.service.create_asset(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn update_asset(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<UpdateAssetRequest>,
) -> PrpcResult<Asset> {
    handle(SERVICE_NAME, "UpdateAsset", async move {
        state.service.update_asset(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn get_asset(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<NameRequest>,
) -> PrpcResult<Asset> {
    handle(SERVICE_NAME, "GetAsset", async move {
        state.service.get_asset(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn batch_get_assets(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<BatchGetRequest>,
) -> PrpcResult<BatchGetAssetsResponse> {
    handle(SERVICE_NAME, "BatchGetAssets", async move {
        state.service.batch_get_assets(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn list_assets(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListRequest>,
) -> PrpcResult<ListAssetsResponse> {
    handle(SERVICE_NAME, "ListAssets", async move {
        state.service.list_assets(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn delete_asset(
    State(state): State<UfsState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<NameRequest>,
) -> PrpcResult<Empty> {
    handle(SERVICE_NAME, "DeleteAsset", async move {
        state.service.delete_asset(&caller, req).await.map_err(Status::from)
    })
    .await
}
