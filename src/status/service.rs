use std::future::Future;
use std::num::IntErrorKind;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::{ErrorDetail, StatusDirectory, StatusResponse};

pub fn router(directory: Arc<StatusDirectory>) -> Router {
    Router::new()
        .route("/users/{user_id}/status", get(get_user_status))
        .layer(TraceLayer::new_for_http())
        .with_state(directory)
}

/// Serves the directory on `listener` until `shutdown` resolves.
pub async fn serve<S>(
    listener: TcpListener,
    directory: Arc<StatusDirectory>,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, users = directory.len(), "status service listening");
    }

    axum::serve(listener, router(directory))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn get_user_status(
    State(directory): State<Arc<StatusDirectory>>,
    Path(raw_user_id): Path<String>,
) -> Response {
    let user_id = match raw_user_id.parse::<i64>() {
        Ok(user_id) => user_id,
        // Well-formed but out of range: no such user can exist.
        Err(err)
            if matches!(
                err.kind(),
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow
            ) =>
        {
            debug!(user_id = %raw_user_id, "status lookup miss (out of range)");
            return not_found(&raw_user_id);
        }
        Err(_) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorDetail {
                    detail: format!("user_id must be an integer, got '{raw_user_id}'."),
                }),
            )
                .into_response();
        }
    };

    match directory.lookup(user_id) {
        Some(app_status) => {
            debug!(user_id, %app_status, "status lookup hit");
            Json(StatusResponse {
                user_id,
                app_status,
                message: format!("Status retrieved successfully for user {user_id}."),
            })
            .into_response()
        }
        None => {
            debug!(user_id, "status lookup miss");
            not_found(user_id)
        }
    }
}

fn not_found(user_id: impl std::fmt::Display) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorDetail {
            detail: format!("User with ID {user_id} not found."),
        }),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) async fn spawn_local(directory: StatusDirectory) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve(
        listener,
        Arc::new(directory),
        std::future::pending::<()>(),
    ));
    addr
}
