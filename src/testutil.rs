//! Loopback HTTP fixtures shared by the async tests.

use crate::db::Endpoint;

use axum::{
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral loopback port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A URL nothing is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

/// Routes with fixed behaviour for probe tests.
pub fn test_router() -> Router {
    Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/fail", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/hang",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        )
        .route("/moved", get(|| async { Redirect::permanent("/ok") }))
        .route(
            "/echo",
            post(|headers: HeaderMap, body: String| async move {
                let keyed = headers.get("x-api-key").is_some_and(|v| v == "secret");
                if keyed && body == r#"{"id":0}"# {
                    StatusCode::CREATED
                } else {
                    StatusCode::BAD_REQUEST
                }
            }),
        )
}

pub fn endpoint(id: i64, name: &str, url: &str) -> Endpoint {
    Endpoint {
        id,
        name: name.to_string(),
        url: url.to_string(),
        method: "GET".to_string(),
        headers: None,
        body: None,
        expected_status: 200,
        created_at: Utc::now(),
    }
}
