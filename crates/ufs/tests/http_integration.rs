//! UFS pRPC 接口集成测试

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use fleet_common::Datastore;
use fleet_common::config::UfsConfig;
use fleet_common::prpc::{GRPC_CODE_HEADER, IDENTITY_HEADER};
use serde_json::{Value, json};
use tower::ServiceExt;
use ufs::perms::{self, permission};
use ufs::{FleetService, UfsState, create_router};

const ADMIN: &str = "user:admin@example.com";
const VIEWER: &str = "user:viewer@example.com";

async fn app() -> Router {
    let service = FleetService::new(Datastore::memory(), UfsConfig::default());
    let auth = service.authorizer();
    for collection in ["machines", "racks", "assets"] {
        for verb in [perms::GET, perms::LIST, perms::CREATE, perms::UPDATE, perms::DELETE] {
            auth.grant("@internal:@root", ADMIN, &permission(collection, verb))
                .await
                .unwrap();
        }
    }
    auth.grant("@internal:ufs/os-atl", VIEWER, &permission("machines", perms::LIST))
        .await
        .unwrap();
    create_router(UfsState::new(service))
}

async fn call(app: &Router, method: &str, identity: &str, body: Value) -> (StatusCode, String, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/prpc/ufs.Fleet/{method}"))
        .header("content-type", "application/json")
        .header(IDENTITY_HEADER, identity)
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
async fn test_machine_lifecycle() {
    let app = app().await;

    let (status, _, machine) = call(
        &app,
        "CreateMachine",
        ADMIN,
        json!({
            "machineId": "chromeos1-row1-rack1-host1",
            "machine": {
                "serialNumber": "SN-1",
                "location": {"zone": 10, "rack": "chromeos1-row1-rack1"},
                "tags": ["dut"]
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(machine["name"], "machines/chromeos1-row1-rack1-host1");
    assert_eq!(machine["realm"], "@internal:ufs/os-atl");

    let (status, _, updated) = call(
        &app,
        "UpdateMachine",
        ADMIN,
        json!({
            "machine": {"name": "machines/chromeos1-row1-rack1-host1", "model": "eve"},
            "updateMask": "model"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["model"], "eve");
    assert_eq!(updated["serialNumber"], "SN-1");

    let (status, _, listed) = call(&app, "ListMachines", VIEWER, json!({"filter": "tags=dut"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["machines"].as_array().unwrap().len(), 1);

    // viewer 只有 list 权限
    let (status, code, _) = call(
        &app,
        "GetMachine",
        VIEWER,
        json!({"name": "machines/chromeos1-row1-rack1-host1"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(code, "7");

    let (status, _, _) = call(
        &app,
        "DeleteMachine",
        ADMIN,
        json!({"name": "machines/chromeos1-row1-rack1-host1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, code, _) = call(
        &app,
        "GetMachine",
        ADMIN,
        json!({"name": "machines/chromeos1-row1-rack1-host1"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(code, "5");
}

#[tokio::test]
async fn test_error_codes() {
    let app = app().await;

    let (status, code, _) = call(&app, "ListRacks", ADMIN, json!({"filter": "color=red"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "3");

    let (status, _, _) = call(
        &app,
        "CreateRack",
        ADMIN,
        json!({"rackId": "rack-1", "rack": {"location": {"zone": 10}}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, code, _) = call(
        &app,
        "CreateRack",
        ADMIN,
        json!({"rackId": "rack-1", "rack": {}}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(code, "6");

    let (status, _, _) = call(
        &app,
        "CreateAsset",
        ADMIN,
        json!({"asset": {"name": "assets/a1", "type": 1, "location": {"zone": 10, "rack": "rack-1"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, code, body) = call(&app, "DeleteRack", ADMIN, json!({"name": "racks/rack-1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(code, "9");
    assert!(body["message"].as_str().unwrap().contains("assets/a1"));

    let (status, _, assets) = call(
        &app,
        "BatchGetAssets",
        ADMIN,
        json!({"names": ["assets/a1"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assets["assets"][0]["realm"], "@internal:ufs/os-atl");
}
