//! Single-route web server that hands out the current game as a PGN file.
//!
//! `GET /` and `GET /game.pgn` download the file; `POST` on either renders the
//! static charts page.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const PGN_CONTENT_TYPE: &str = "application/x-chess-pgn";
pub const PGN_CONTENT_DISPOSITION: &str = "attachment; filename=game.pgn";

const CHARTS_TEMPLATE: &str = include_str!("../templates/charts.html");
const CHARTS_PAGE: &str = "charts";

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

#[derive(Clone)]
struct PgnState {
    pgn_path: Arc<PathBuf>,
}

pub fn router(pgn_path: PathBuf) -> Router {
    let state = PgnState {
        pgn_path: Arc::new(pgn_path),
    };

    Router::new()
        .route("/", get(download_pgn).post(render_charts))
        .route("/game.pgn", get(download_pgn).post(render_charts))
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: SocketAddr, pgn_path: PathBuf) -> Result<(), WebError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| WebError::Bind { addr, source })?;
    tracing::info!("PGN server listening on {}", addr);

    axum::serve(listener, router(pgn_path))
        .await
        .map_err(WebError::Serve)
}

async fn download_pgn(State(state): State<PgnState>) -> Response {
    tracing::info!("Downloading pgn from {}", state.pgn_path.display());

    match tokio::fs::read(&*state.pgn_path).await {
        Ok(contents) => (
            [
                (header::CONTENT_TYPE, PGN_CONTENT_TYPE),
                (header::CONTENT_DISPOSITION, PGN_CONTENT_DISPOSITION),
            ],
            contents,
        )
            .into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!("PGN file {} not found", state.pgn_path.display());
            (StatusCode::NOT_FOUND, "game.pgn not found").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to read {}: {}", state.pgn_path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to read game.pgn").into_response()
        }
    }
}

async fn render_charts() -> Html<String> {
    Html(render_page(CHARTS_TEMPLATE, CHARTS_PAGE))
}

fn render_page(template: &str, page: &str) -> String {
    template.replace("{{ page }}", page)
}
