//! Inventory pRPC 接口集成测试

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use fleet_common::Datastore;
use fleet_common::config::InventoryConfig;
use fleet_common::prpc::{GRPC_CODE_HEADER, IDENTITY_HEADER};
use fleet_proto::inventory::{DeviceUnderTest, Environment, Lab, Server, ServerRole};
use inventory::{FileStore, InventoryService, InventoryState, InventoryStore, create_router};
use serde_json::{Value, json};
use tower::ServiceExt;

fn lab() -> Lab {
    let dut = |id: &str, model: &str, pool: &str| DeviceUnderTest {
        id: id.to_string(),
        hostname: format!("chromeos6-row1-rack1-{id}"),
        model: model.to_string(),
        pools: vec![pool.to_string()],
        environment: Environment::Prod as i32,
        ..Default::default()
    };
    Lab {
        duts: vec![
            dut("host1", "eve", "DUT_POOL_CQ"),
            dut("host2", "eve", "DUT_POOL_SUITES"),
            dut("host3", "eve", "DUT_POOL_SUITES"),
            dut("host4", "nami", "DUT_POOL_CQ"),
        ],
        servers: vec![Server {
            hostname: "drone1.example.com".to_string(),
            environment: Environment::Prod as i32,
            roles: vec![ServerRole::SkylabDrone as i32],
            ..Default::default()
        }],
    }
}

async fn app(dir: &tempfile::TempDir) -> Router {
    let store = FileStore::new(dir.path().join("lab.json"));
    store.commit(&lab(), "", "seed").await.unwrap();
    let service = InventoryService::new(Arc::new(store), Datastore::memory(), InventoryConfig::default());
    create_router(InventoryState::new(service))
}

async fn call(app: &Router, method: &str, body: Value) -> (StatusCode, String, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/prpc/inventory.Inventory/{method}"))
        .header("content-type", "application/json")
        .header(IDENTITY_HEADER, "user:admin@example.com")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let code = response
        .headers()
        .get(GRPC_CODE_HEADER)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, code, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_pools_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let (status, _, resized) = call(
        &app,
        "ResizePool",
        json!({
            "dutSelector": {"model": "eve"},
            "targetPool": "DUT_POOL_CQ",
            "targetPoolSize": 2
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resized["changes"][0]["dutId"], "host2");
    assert!(!resized["revision"].as_str().unwrap().is_empty());

    let (status, code, _) = call(
        &app,
        "ResizePool",
        json!({
            "dutSelector": {"model": "eve"},
            "targetPool": "DUT_POOL_CQ",
            "targetPoolSize": 10
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "9");

    let (status, _, _) = call(
        &app,
        "UpdateDutState",
        json!({"state": {"dutId": "host1", "health": 2, "reason": "servo broken"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = call(&app, "UpdateDutState", json!({"state": {"dutId": "host3", "health": 1}})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, balanced) = call(&app, "BalancePools", json!({"targetPool": "DUT_POOL_CQ"})).await;
    assert_eq!(status, StatusCode::OK);
    let eve = &balanced["modelResults"][0];
    assert_eq!(eve["model"], "eve");
    assert_eq!(eve["targetPoolUnhealthyBefore"], 1);
    assert_eq!(eve["remainingUnhealthy"], 0);

    let (status, _, listed) = call(&app, "ListDuts", json!({"pool": "DUT_POOL_CQ", "model": "eve"})).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = listed["duts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["host2", "host3"]);
}

#[tokio::test]
async fn test_drones_and_duts_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir).await;

    let (status, _, assigned) = call(
        &app,
        "AssignDutsToDrones",
        json!({"assignments": [{"dutId": "host1"}, {"dutId": "host2"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["assigned"][1]["droneHostname"], "drone1.example.com");

    let (status, code, _) = call(&app, "AssignDutsToDrones", json!({"assignments": [{"dutId": "host1"}]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "3");

    let (status, _, info) = call(&app, "GetDutInfo", json!({"hostname": "chromeos6-row1-rack1-host1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["drone"], "drone1.example.com");
    assert_eq!(info["dut"]["model"], "eve");

    let (status, _, removed) = call(
        &app,
        "RemoveDutsFromDrones",
        json!({"removals": [{"dutId": "host1", "droneHostname": "drone1.example.com"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"][0]["dutId"], "host1");

    let (status, _, deleted) = call(
        &app,
        "DeleteDuts",
        json!({"hostnames": ["chromeos6-row1-rack1-host2"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["changed"], true);

    let (status, _, servers) = call(&app, "ListServers", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(servers["servers"][0]["dutUids"].as_array().map_or(true, |u| u.is_empty()));

    let (status, code, _) = call(&app, "GetDutInfo", json!({"id": "host2"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code, "5");
}
