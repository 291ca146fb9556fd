//! Router-level tests driving the API with in-memory state.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use meshgate_common::{Database, ExtClient, Host, Node, PasswordHasher, RecordStore};
use meshgate_web::{
    api_router, AppState, AuthConfig, BrokerSettings, CleanupWorker, MigrationDefaults,
    StoreServerInfo,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    db: Arc<Database>,
    router: Router,
    worker: Option<CleanupWorker>,
}

fn test_app() -> TestApp {
    let db = Arc::new(Database::open_memory().unwrap());
    let (queue, worker) = CleanupWorker::new(db.clone(), 16);
    let server_info = Arc::new(StoreServerInfo::new(db.clone(), BrokerSettings::default()));
    let state = AppState::new(
        db.clone(),
        Arc::new(PasswordHasher::new()),
        AuthConfig {
            jwt_secret: Some("test-secret".into()),
            ..Default::default()
        },
        server_info,
        MigrationDefaults::default(),
        queue,
    );
    TestApp {
        db,
        router: api_router(state),
        worker: Some(worker),
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &TestApp, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/users/adm/authenticate",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["auth_token"].as_str().unwrap().to_string()
}

async fn bootstrap(app: &TestApp) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/users/adm/createsuperadmin",
        None,
        Some(json!({"username": "root", "password": "rootpass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    login(app, "root", "rootpass").await
}

#[tokio::test]
async fn superadmin_bootstrap_and_transfer() {
    let app = test_app();

    let (_, has) = send(&app, Method::GET, "/api/users/adm/hassuperadmin", None, None).await;
    assert_eq!(has, json!(false));

    let root = bootstrap(&app).await;
    let (_, has) = send(&app, Method::GET, "/api/users/adm/hassuperadmin", None, None).await;
    assert_eq!(has, json!(true));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users/adm/createsuperadmin",
        None,
        Some(json!({"username": "again", "password": "again-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/dana",
        Some(&root),
        Some(json!({"password": "danapass", "is_admin": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_admin"], json!(true));
    assert!(body.get("password").is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/users/adm/transfersuperadmin/dana",
        Some(&root),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_super_admin"], json!(true));
    assert_eq!(body["is_admin"], json!(false));

    let root_user = app.db.fetch_user("root").unwrap();
    assert!(root_user.is_admin);
    assert!(!root_user.is_super_admin);

    // The old token still names root, who is now only an admin
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users/adm/transfersuperadmin/root",
        Some(&root),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn errors_render_code_and_message() {
    let app = test_app();

    let (status, body) = send(&app, Method::GET, "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!(401));
    assert!(body["message"].is_string());

    let root = bootstrap(&app).await;
    let (status, body) = send(&app, Method::GET, "/api/users/ghost", Some(&root), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("user ghost not found"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users/adm/authenticate",
        None,
        Some(json!({"username": "root", "password": "wrong-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_cannot_update_admin() {
    let app = test_app();
    let root = bootstrap(&app).await;
    for name in ["bob", "carol"] {
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/users/{}", name),
            Some(&root),
            Some(json!({"password": "secret", "is_admin": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    let bob = login(&app, "bob", "secret").await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/carol",
        Some(&bob),
        Some(json!({"password": "hijacked"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/users/bob",
        Some(&bob),
        Some(json!({"is_admin": false})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, "/api/users/root", Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/api/users", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn gateway_binding_flow() {
    let mut app = test_app();
    let root = bootstrap(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users/alice",
        Some(&root),
        Some(json!({"password": "alicepass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let host = Host::new("edge-1", "meshgate");
    app.db.put_host(&host).unwrap();
    let mut node = Node::new(Uuid::new_v4(), host.id, "office");
    node.is_ingress_gateway = true;
    app.db.put_node(&node).unwrap();

    let attach_uri = format!("/api/users/alice/remote_access_gw/{}", node.id);
    for _ in 0..2 {
        let (status, body) = send(&app, Method::POST, &attach_uri, Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["remote_gw_ids"].as_array().unwrap().len(), 1);
    }

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users/alice/remote_access_gw/not-a-uuid",
        Some(&root),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Alice cannot manage her own bindings
    let alice = login(&app, "alice", "alicepass").await;
    let (status, _) = send(&app, Method::POST, &attach_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.db
        .put_ext_client(&ExtClient {
            client_id: "laptop".into(),
            network: "office".into(),
            owner_id: "alice".into(),
            ingress_gateway_id: node.id,
            remote_access_client_id: "rac-1".into(),
            public_key: String::new(),
            address: None,
            enabled: true,
            last_modified: 0,
        })
        .unwrap();

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/users/alice/remote_access_gw?remote_access_clientid=rac-1",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let office = body["office"].as_array().unwrap();
    assert_eq!(office.len(), 1);
    assert_eq!(office[0]["connected"], json!(true));
    assert_eq!(office[0]["gw_name"], json!("edge-1"));

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/users/alice/remote_access_gw",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only alice may ask for her view, and elevated users have no view at all
    let (status, _) = send(
        &app,
        Method::GET,
        "/api/users/alice/remote_access_gw?remote_access_clientid=rac-1",
        Some(&root),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/users/root/remote_access_gw?remote_access_clientid=rac-1",
        Some(&root),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(400));

    let worker = app.worker.take().unwrap().spawn();
    let (status, body) = send(&app, Method::DELETE, &attach_uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["remote_gw_ids"].as_array().unwrap().is_empty());

    // Dropping the router drops the last queue handle and stops the worker
    let db = app.db.clone();
    drop(app);
    worker.await.unwrap();
    assert!(db.list_ext_clients().unwrap().is_empty());
}

#[tokio::test]
async fn migrate_legacy_nodes() {
    let app = test_app();
    let id = Uuid::new_v4();
    let record = json!({
        "id": id.to_string(),
        "name": "old-box",
        "network": "office",
        "password": bcrypt::hash("node-secret", 4).unwrap(),
        "address": "10.1.0.9",
        "networksettings": {"addressrange": "10.1.0.0/24"},
        "listenport": 51820,
        "isingressgateway": "no"
    });
    app.db
        .put_legacy_record(&id.to_string(), &record.to_string())
        .unwrap();

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/nodes/migrate",
        None,
        Some(json!({"host_name": "new-box", "legacy_nodes": [{"id": id.to_string(), "password": "wrong"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/nodes/migrate",
        None,
        Some(json!({"host_name": "new-box", "legacy_nodes": [{"id": id.to_string(), "password": "node-secret"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["host"]["name"], json!("new-box"));
    assert_eq!(body["nodes"][0]["address"], json!("10.1.0.9/24"));
    assert!(!body["server_config"]["traffic_key"].as_str().unwrap().is_empty());

    assert_eq!(app.db.list_nodes().unwrap().len(), 1);
    assert!(app.db.get_legacy_record(&id.to_string()).unwrap().is_none());
}
