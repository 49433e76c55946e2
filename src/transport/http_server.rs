use axum::{Json, Router, extract::State, routing::get};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{configs::ServerConfig, player::SessionStatus};

const ALIVE: &str = "Airwave radio is running!";

/// `GET /` answers 200 whatever the session is doing; `GET /status` reports it.
pub fn router(status: watch::Receiver<SessionStatus>) -> Router {
    Router::new()
        .route("/", get(alive))
        .route("/status", get(session_status))
        .with_state(status)
        .layer(TraceLayer::new_for_http())
}

async fn alive() -> &'static str {
    ALIVE
}

async fn session_status(State(status): State<watch::Receiver<SessionStatus>>) -> Json<SessionStatus> {
    Json(*status.borrow())
}

/// Runs the liveness listener until `shutdown` fires.
pub async fn serve(
    config: &ServerConfig,
    status: watch::Receiver<SessionStatus>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Liveness server listening on {}", address);

    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::player::{Phase, SessionState};

    /// The receiver keeps the last value after the sender is gone.
    fn idle() -> watch::Receiver<SessionStatus> {
        watch::channel(SessionState::new().status()).1
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_is_always_ok() {
        let (status, body) = get_body(router(idle()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ALIVE);
    }

    #[tokio::test]
    async fn root_ignores_session_state() {
        let (tx, rx) = watch::channel(SessionState::new().status());
        tx.send_modify(|s| {
            s.phase = Phase::Playing;
            s.connected = true;
            s.playing = true;
        });

        let (status, _) = get_body(router(rx.clone()), "/").await;
        assert_eq!(status, StatusCode::OK);

        drop(tx);
        let (status, _) = get_body(router(rx), "/").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_latest_snapshot() {
        let (tx, rx) = watch::channel(SessionState::new().status());
        tx.send_modify(|s| {
            s.phase = Phase::Connecting;
            s.present = true;
            s.generation = 4;
        });

        let (status, body) = get_body(router(rx), "/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["phase"], "connecting");
        assert_eq!(json["present"], true);
        assert_eq!(json["playing"], false);
        assert_eq!(json["generation"], 4);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (status, _) = get_body(router(idle()), "/v4/info").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
