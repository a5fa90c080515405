//! Drives the `reqwest` transport against an in-process ArgoCD stand-in.

mod mock;

use argocd_client::{
    ArgoCdClient, ClientConfig, CredentialSource, ErrorKind, HttpStatusCode, ReqwestTransport,
    StatusCode,
};
use axum::extract::{Path, State};
use axum::http::{self, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use mock::{init_logger, FakeAmbient, FakeSecrets};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOKEN: &str = "server-token";

/// Application actions the server received, as `(name, action)`.
type Actions = Arc<Mutex<Vec<(String, String)>>>;

async fn session(Json(body): Json<Value>) -> Result<Json<Value>, http::StatusCode> {
    if body == json!({"username": "admin", "password": "password"}) {
        Ok(Json(json!({ "token": TOKEN })))
    } else {
        Err(http::StatusCode::UNAUTHORIZED)
    }
}

fn authorized(headers: &HeaderMap) -> Result<(), http::StatusCode> {
    let expected = format!("Bearer {}", TOKEN);
    match headers.get("authorization") {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err(http::StatusCode::UNAUTHORIZED),
    }
}

async fn applications(headers: HeaderMap) -> Result<Json<Value>, http::StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!({
        "metadata": {"resourceVersion": "1"},
        "items": [{"metadata": {"name": "guestbook", "namespace": "argocd"}}]
    })))
}

async fn clusters(headers: HeaderMap) -> Result<Json<Value>, http::StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!({"metadata": {}})))
}

async fn application_action(
    State(actions): State<Actions>,
    Path((name, action)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, http::StatusCode> {
    authorized(&headers)?;
    if body != json!({}) {
        return Err(http::StatusCode::BAD_REQUEST);
    }
    if name == "missing" {
        return Err(http::StatusCode::NOT_FOUND);
    }
    actions.lock().unwrap().push((name, action));
    Ok(Json(json!({})))
}

/// Start the server on its own thread and runtime and return its address.
fn serve(actions: Actions) -> SocketAddr {
    let router = Router::new()
        .route("/api/v1/session", post(session))
        .route("/api/v1/applications", get(applications))
        .route("/api/v1/clusters", get(clusters))
        .route(
            "/api/v1/applications/{name}/{action}",
            post(application_action),
        )
        .with_state(actions);

    let (sender, receiver) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            sender.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, router).await.unwrap();
        });
    });
    receiver.recv().unwrap()
}

fn connect(addr: SocketAddr, secrets: &FakeSecrets) -> argocd_client::Result<ArgoCdClient> {
    init_logger();
    let config = ClientConfig::builder()
        .host(format!("http://{}/", addr))
        .timeout(Duration::from_secs(5))
        .build()?;
    let transport = ReqwestTransport::new(config.verify_tls(), config.timeout())?;
    ArgoCdClient::with_parts(
        config,
        Box::new(transport),
        &FakeAmbient::token("Bearer k8s"),
        secrets,
    )
}

#[test]
fn round_trip_over_http() {
    let actions = Actions::default();
    let addr = serve(actions.clone());

    // The ambient token is rejected, so the admin secret is used.
    let client = connect(addr, &FakeSecrets::admin_password("cGFzc3dvcmQ=")).unwrap();
    assert_eq!(client.credential_source(), CredentialSource::AdminSecret);

    let apps = client.list_applications().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0]["metadata"]["name"], "guestbook");
    assert!(client.list_clusters().unwrap().is_empty());

    client.refresh_application("guestbook").unwrap();
    client.sync_application("guestbook").unwrap();
    assert_eq!(
        *actions.lock().unwrap(),
        vec![
            ("guestbook".to_string(), "refresh".to_string()),
            ("guestbook".to_string(), "sync".to_string()),
        ]
    );

    let error = client.sync_application("missing").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Request);
    assert!(error.is_status_code(StatusCode::NOT_FOUND));
}

#[test]
fn wrong_admin_password_over_http() {
    let addr = serve(Actions::default());

    // base64 for "hunter2"
    let error = connect(addr, &FakeSecrets::admin_password("aHVudGVyMg==")).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Authentication);
    assert!(error.is_status_code(StatusCode::UNAUTHORIZED));
}

#[test]
fn unreachable_server_is_a_transport_error() {
    // Bind and drop a listener to find a port nothing is listening on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let config = ClientConfig::builder()
        .host(format!("http://{}", addr))
        .credentials("foo", "bar")
        .build()
        .unwrap();
    let transport = ReqwestTransport::new(true, Duration::from_secs(5)).unwrap();

    let error = ArgoCdClient::with_parts(
        config,
        Box::new(transport),
        &FakeAmbient::none(),
        &FakeSecrets::missing(),
    )
    .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Transport);
}
