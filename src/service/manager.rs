//! 服务管理器模块 - 负责管理多个服务的生命周期
//!
//! 所有服务的路由合并到同一个 HTTP 服务器，另外挂载 `/metrics` 与 `/health`。

use crate::service::ServiceCollector;
use crate::service::container::ServiceContainer;
use crate::service::trace::http_trace_layer;
use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fleet_common::config::FleetConfig;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use url::Url;

/// 服务管理器，负责管理多个服务的生命周期
#[derive(Debug)]
pub struct ServiceManager {
    services: Vec<ServiceContainer>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
    service_collector: ServiceCollector,
    config: FleetConfig,
}

impl ServiceManager {
    pub fn new(config: FleetConfig, shutdown_tx: tokio::sync::broadcast::Sender<()>) -> Self {
        Self {
            services: Vec::new(),
            shutdown_tx,
            service_collector: ServiceCollector::new(),
            config,
        }
    }

    /// 添加服务到管理器
    pub fn add_service(&mut self, service: ServiceContainer) {
        info!("Adding service '{}' to manager", service.info().name);
        self.services.push(service);
    }

    pub fn service_collector(&self) -> ServiceCollector {
        self.service_collector.clone()
    }

    fn base_url(&self) -> Result<Url> {
        let http = &self.config.bind.http;
        Url::parse(&format!("http://{}:{}", http.ip, http.port))
            .map_err(|e| anyhow::anyhow!("Failed to parse HTTP URL: {e}"))
    }

    /// 构建合并后的路由器
    ///
    /// 某个服务的路由器构建或启动回调失败时直接返回错误，不以缺少服务的状态启动。
    pub async fn build_app(&mut self) -> Result<Router> {
        let base_url = self.base_url()?;
        let mut app = Router::new();

        for service in &mut self.services {
            let name = service.info().name.clone();
            let router = service
                .build_router()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to build router for service '{name}': {e}"))?;
            info!(
                "Mounting service '{}' ({})",
                name,
                service.info().prpc_services.join(", ")
            );
            app = app.merge(router);

            service
                .on_start(base_url.clone())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to start service '{name}': {e:#}"))?;
            self.service_collector
                .insert(name, service.info().clone())
                .await;
        }

        let health = Router::new()
            .route("/health", get(health_handler))
            .with_state(self.service_collector.clone());

        Ok(app
            .route("/metrics", get(metrics_handler))
            .merge(health)
            .layer(http_trace_layer())
            .layer(CorsLayer::permissive()))
    }

    /// 启动 HTTP 服务器和各服务的后台任务
    pub async fn start_all(&mut self) -> Result<Vec<JoinHandle<()>>> {
        info!(
            "Starting {} services ({})",
            self.services.len(),
            self.services
                .iter()
                .map(|s| s.info().service_type.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let app = self.build_app().await?;
        let addr: std::net::SocketAddr = self
            .config
            .http_addr()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {e}", self.config.http_addr()))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to address '{addr}': {e}"))?;
        info!("HTTP server listening on {}", addr);

        let mut handles = Vec::new();
        let shutdown_tx = self.shutdown_tx.clone();
        handles.push(tokio::spawn(async move {
            let mut shutdown_rx = shutdown_tx.subscribe();
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
                let _ = shutdown_tx.send(());
            }
            info!("HTTP server stopped");
        }));

        for service in &self.services {
            if let Some(handle) = service.spawn_background(self.shutdown_tx.subscribe()) {
                info!("Started background task for '{}'", service.info().name);
                handles.push(handle);
            }
        }

        Ok(handles)
    }

    /// Stop all services
    pub async fn stop_all(&mut self) -> Result<()> {
        info!("Stopping all services");

        let _ = self.shutdown_tx.send(());
        for service in &mut self.services {
            if let Err(e) = service.on_stop().await {
                error!("Failed to stop service '{}': {:?}", service.info().name, e);
            }
        }
        self.service_collector.mark_all_stopped().await;

        info!("All services stopped");
        Ok(())
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> Response {
    match fleet_common::metrics::export_metrics() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(collector): State<ServiceCollector>) -> Json<serde_json::Value> {
    let services = collector.values().await;
    let healthy = services.iter().all(|s| s.is_running());
    Json(json!({
        "status": if healthy { "ok" } else { "degraded" },
        "services": services,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{KarteHttpService, ServiceType, UfsHttpService, WeetbixHttpService};
    use axum::body::Body;
    use axum::http::Request;
    use fleet_common::Datastore;
    use tower::ServiceExt;

    fn manager() -> ServiceManager {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(4);
        let config = FleetConfig::default();
        let store = Datastore::memory();
        let mut manager = ServiceManager::new(config.clone(), shutdown_tx);
        manager.add_service(ServiceContainer::ufs(UfsHttpService::new(
            config.ufs_config(),
            store.clone(),
        )));
        manager.add_service(ServiceContainer::weetbix(WeetbixHttpService::new(
            config.weetbix_config(),
            store,
        )));
        manager
    }

    #[tokio::test]
    async fn test_health_lists_running_services() {
        let mut manager = manager();
        let app = manager.build_app().await.unwrap();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["services"].as_array().unwrap().len(), 2);

        let infos = manager.service_collector().values().await;
        assert!(infos.iter().any(|i| i.service_type == ServiceType::Ufs));
    }

    #[tokio::test]
    async fn test_merged_router_serves_prpc_and_metrics() {
        let mut manager = manager();
        let app = manager.build_app().await.unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::post("/prpc/ufs.Fleet/ListMachines")
                    .header("content-type", "application/json")
                    .header("x-fleet-identity", "user:admin@example.com")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        // 由 UFS 处理器响应，而不是路由缺失
        assert_ne!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stop_all_marks_services_stopped() {
        let mut manager = manager();
        manager.build_app().await.unwrap();
        manager.stop_all().await.unwrap();
        let infos = manager.service_collector().values().await;
        assert!(infos.iter().all(|i| !i.is_running()));
    }

    #[tokio::test]
    async fn test_start_failure_aborts_build() {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(4);
        let config = FleetConfig::default();
        let mut karte = config.karte_config();
        karte.persist.enable = true;
        karte.persist.output_path = "/proc/fleetd-karte-export".to_string();

        let mut manager = ServiceManager::new(config, shutdown_tx);
        manager.add_service(ServiceContainer::karte(KarteHttpService::new(
            karte,
            Datastore::memory(),
        )));

        let err = manager.build_app().await.unwrap_err();
        assert!(err.to_string().contains("Karte Service"));
        assert!(manager.service_collector().values().await.is_empty());
    }
}
