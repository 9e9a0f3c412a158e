//! Karte pRPC 处理器

use std::path::Path;
use std::sync::Arc;

use axum::{Router, extract::State, routing::post};
use fleet_common::config::KarteConfig;
use fleet_common::prpc::{PrpcRequest, PrpcResult, handle, method_path};
use fleet_common::Datastore;
use fleet_proto::karte::{
    Action, CreateActionRequest, CreateObservationRequest, ListActionsRequest,
    ListActionsResponse, ListObservationsRequest, ListObservationsResponse, Observation,
    PersistActionRangeRequest, PersistActionRangeResponse, SERVICE_NAME, UpdateActionRequest,
};
use tonic::Status;
use tracing::info;

use crate::service::KarteService;
use crate::sink::{NdjsonSink, RowSink};

/// Karte 服务状态
#[derive(Clone, Debug)]
pub struct KarteState {
    pub service: KarteService,
}

impl KarteState {
    pub fn new(service: KarteService) -> Self {
        Self { service }
    }
}

/// 根据配置创建服务状态，导出目标为 `persist.output_path` 下的 NDJSON 文件
pub fn create_karte_state(store: Datastore, config: &KarteConfig) -> KarteState {
    let sink: Arc<dyn RowSink> = Arc::new(NdjsonSink::new(Path::new(&config.persist.output_path)));
    info!(
        seal_duration_secs = config.seal_duration_secs,
        output = %config.persist.output_path,
        "Initializing Karte state"
    );
    KarteState::new(KarteService::new(store, sink, config))
}

/// 创建 Karte 路由
pub fn create_router(state: KarteState) -> Router {
    Router::new()
        .route(&method_path(SERVICE_NAME, "CreateAction"), post(create_action))
        .route(&method_path(SERVICE_NAME, "UpdateAction"), post(update_action))
        .route(
            &method_path(SERVICE_NAME, "CreateObservation"),
            post(create_observation),
        )
        .route(&method_path(SERVICE_NAME, "ListActions"), post(list_actions))
        .route(
            &method_path(SERVICE_NAME, "ListObservations"),
            post(list_observations),
        )
        .route(
            &method_path(SERVICE_NAME, "PersistActionRange"),
            post(persist_action_range),
        )
        .with_state(state)
}

async fn create_action(
    State(state): State<KarteState>,
    PrpcRequest(req): PrpcRequest<CreateActionRequest>,
) -> PrpcResult<Action> {
    handle(SERVICE_NAME, "CreateAction", async move {
        state.service.create_action(req).await.map_err(Status::from)
    })
    .await
}

async fn update_action(
    State(state): State<KarteState>,
    PrpcRequest(req): PrpcRequest<UpdateActionRequest>,
) -> PrpcResult<Action> {
    handle(SERVICE_NAME, "UpdateAction", async move {
        state.service.update_action(req).await.map_err(Status::from)
    })
    .await
}

async fn create_observation(
    State(state): State<KarteState>,
    PrpcRequest(req): PrpcRequest<CreateObservationRequest>,
) -> PrpcResult<Observation> {
    handle(SERVICE_NAME, "CreateObservation", async move {
        state
            .service
            .create_observation(req)
            .await
            .map_err(Status::from)
    })
    .await
}

async fn list_actions(
    State(state): State<KarteState>,
    PrpcRequest(req): PrpcRequest<ListActionsRequest>,
) -> PrpcResult<ListActionsResponse> {
    handle(SERVICE_NAME, "ListActions", async move {
        state.service.list_actions(req).await.map_err(Status::from)
    })
    .await
}

async fn list_observations(
    State(state): State<KarteState>,
    PrpcRequest(req): PrpcRequest<ListObservationsRequest>,
) -> PrpcResult<ListObservationsResponse> {
    handle(SERVICE_NAME, "ListObservations", async move {
        state
            .service
            .list_observations(req)
            .await
            .map_err(Status::from)
    })
    .await
}

async fn persist_action_range(
    State(state): State<KarteState>,
    PrpcRequest(req): PrpcRequest<PersistActionRangeRequest>,
) -> PrpcResult<PersistActionRangeResponse> {
    handle(SERVICE_NAME, "PersistActionRange", async move {
        state
            .service
            .persist_action_range(req)
            .await
            .map_err(Status::from)
    })
    .await
}
