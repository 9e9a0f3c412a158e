//! Weetbix pRPC 处理器

use axum::{Router, extract::State, routing::post};
use fleet_common::config::WeetbixConfig;
use fleet_common::prpc::{PrpcRequest, PrpcResult, handle, method_path};
use fleet_common::{Caller, Datastore};
use fleet_proto::weetbix::{
    BatchGetClustersRequest, BatchGetClustersResponse, CLUSTERS_SERVICE, ClusterRequest,
    ClusterResponse, CreateRuleRequest, GetProjectConfigRequest, GetRuleRequest,
    ListProjectsRequest, ListProjectsResponse, ListRulesRequest, ListRulesResponse,
    LookupBugRequest, LookupBugResponse, PROJECTS_SERVICE, ProjectConfig, QueryTestHistoryRequest,
    QueryTestHistoryResponse, QueryTestHistoryStatsRequest, QueryTestHistoryStatsResponse,
    QueryVariantsRequest, QueryVariantsResponse, RULES_SERVICE, Rule, TEST_HISTORY_SERVICE,
    UpdateRuleRequest,
};
use tonic::Status;
use tracing::info;

use crate::service::WeetbixService;

/// Weetbix 服务状态
#[derive(Clone, Debug)]
pub struct WeetbixState {
    pub service: WeetbixService,
}

impl WeetbixState {
    pub fn new(service: WeetbixService) -> Self {
        Self { service }
    }
}

pub fn create_weetbix_state(store: Datastore, config: &WeetbixConfig) -> WeetbixState {
    info!(
        max_cluster_request_size = config.max_cluster_request_size,
        max_batch_get_size = config.max_batch_get_size,
        "Initializing Weetbix state"
    );
    WeetbixState::new(WeetbixService::new(store, config.clone()))
}

/// 创建 Weetbix 路由，包含 Rules、Clusters、Projects、TestHistory 四个服务
pub fn create_router(state: WeetbixState) -> Router {
    Router::new()
        .route(&method_path(RULES_SERVICE, "Get"), post(get_rule))
        .route(&method_path(RULES_SERVICE, "List"), post(list_rules))
        .route(&method_path(RULES_SERVICE, "Create"), post(create_rule))
        .route(&method_path(RULES_SERVICE, "Update"), post(update_rule))
        .route(&method_path(RULES_SERVICE, "LookupBug"), post(lookup_bug))
        .route(&method_path(CLUSTERS_SERVICE, "Cluster"), post(cluster))
        .route(&method_path(CLUSTERS_SERVICE, "BatchGet"), post(batch_get_clusters))
        .route(&method_path(PROJECTS_SERVICE, "List"), post(list_projects))
        .route(&method_path(PROJECTS_SERVICE, "GetConfig"), post(get_project_config))
        .route(&method_path(TEST_HISTORY_SERVICE, "Query"), post(query_test_history))
        .route(
            &method_path(TEST_HISTORY_SERVICE, "QueryStats"),
            post(query_test_history_stats),
        )
        .route(
            &method_path(TEST_HISTORY_SERVICE, "QueryVariants"),
            post(query_variants),
        )
        .with_state(state)
}

async fn get_rule(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<GetRuleRequest>,
) -> PrpcResult<Rule> {
    handle(RULES_SERVICE, "Get", async move {
        state.service.get_rule(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn list_rules(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListRulesRequest>,
) -> PrpcResult<ListRulesResponse> {
    handle(RULES_SERVICE, "List", async move {
        state.service.list_rules(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn create_rule(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<CreateRuleRequest>,
) -> PrpcResult<Rule> {
    handle(RULES_SERVICE, "Create", async move {
        state.service.create_rule(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn update_rule(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<UpdateRuleRequest>,
) -> PrpcResult<Rule> {
    handle(RULES_SERVICE, "Update", async move {
        state.service.update_rule(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn lookup_bug(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<LookupBugRequest>,
) -> PrpcResult<LookupBugResponse> {
    handle(RULES_SERVICE, "LookupBug", async move {
        state.service.lookup_bug(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn cluster(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ClusterRequest>,
) -> PrpcResult<ClusterResponse> {
    handle(CLUSTERS_SERVICE, "Cluster", async move {
        state.service.cluster(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn batch_get_clusters(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<BatchGetClustersRequest>,
) -> PrpcResult<BatchGetClustersResponse> {
    handle(CLUSTERS_SERVICE, "BatchGet", async move {
        state
            .service
            .batch_get_clusters(&caller, req)
            .await
            .map_err(Status::from)
    })
    .await
}

async fn list_projects(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<ListProjectsRequest>,
) -> PrpcResult<ListProjectsResponse> {
    handle(PROJECTS_SERVICE, "List", async move {
        state.service.list_projects(&caller, req).await.map_err(Status::from)
    })
    .await
}

async fn get_project_config(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<GetProjectConfigRequest>,
) -> PrpcResult<ProjectConfig> {
    handle(PROJECTS_SERVICE, "GetConfig", async move {
        state
            .service
            .get_project_config(&caller, req)
            .await
            .map_err(Status::from)
    })
    .await
}

async fn query_test_history(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<QueryTestHistoryRequest>,
) -> PrpcResult<QueryTestHistoryResponse> {
    handle(TEST_HISTORY_SERVICE, "Query", async move {
        state
            .service
            .query_test_history(&caller, req)
            .await
            .map_err(Status::from)
    })
    .await
}

async fn query_test_history_stats(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<QueryTestHistoryStatsRequest>,
) -> PrpcResult<QueryTestHistoryStatsResponse> {
    handle(TEST_HISTORY_SERVICE, "QueryStats", async move {
        state
            .service
            .query_test_history_stats(&caller, req)
            .await
            .map_err(Status::from)
    })
    .await
}

async fn query_variants(
    State(state): State<WeetbixState>,
    caller: Caller,
    PrpcRequest(req): PrpcRequest<QueryVariantsRequest>,
) -> PrpcResult<QueryVariantsResponse> {
    handle(TEST_HISTORY_SERVICE, "QueryVariants", async move {
        state
            .service
            .query_variants(&caller, req)
            .await
            .map_err(Status::from)
    })
    .await
}
