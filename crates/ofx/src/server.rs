//! 🌐 The query service: a small axum router in front of the document store.
//!
//! 🧠 Knowledge graph:
//! - `GET /bestOffersByHotel`: cheapest matching offer per hotel.
//! - `GET /hotels/{hotel_id}/offers`: every matching offer of one hotel, cheapest first.
//! - `GET /health`: can we still reach the cluster?
//! - State is an [`AppState`] holding the injected `Arc<dyn DocumentStore>`. No globals.
//! - Layers: CORS for the configured origins (credentials allowed), and request tracing.
//!
//! Errors become JSON `{"error": "..."}`: bad parameters are the client's 400, a failing
//! store is our 502, and a response we can't read is a plain 500.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::app_config::ServerConfig;
use crate::common::HotelId;
use crate::query::{OfferSearchParams, QueryParamError, best_offers_query, hotel_offers_query};
use crate::responses::{
    BestHotelOffer, GetHotelOffersResponse, ResponseError, best_offers_from_response,
    hotel_offers_from_response,
};
use crate::store::DocumentStore;

/// 📦 Everything a handler needs. Cloned per request; the store is shared.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub index: String,
    pub best_offers_bucket_size: usize,
    pub hotel_offers_page_size: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>, server: &ServerConfig) -> Self {
        Self {
            store,
            index: index.into(),
            best_offers_bucket_size: server.best_offers_bucket_size,
            hotel_offers_page_size: server.hotel_offers_page_size,
        }
    }
}

/// 💀 Everything a handler can fail with, and the status each one earns.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidParams(#[from] QueryParamError),
    #[error("Invalid path: hotel id must be an integer, got '{0}'")]
    InvalidHotelId(String),
    #[error("The search backend is unavailable")]
    Store(#[source] anyhow::Error),
    #[error("The search backend returned an unreadable response")]
    Response(#[from] ResponseError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidParams(_) | ApiError::InvalidHotelId(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(ref err) => {
                error!("💀 search failed: {err:#}");
                StatusCode::BAD_GATEWAY
            }
            ApiError::Response(ref err) => {
                error!("💀 {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// 🗺️ The router, with CORS and tracing applied.
pub fn router(state: AppState, allowed_origins: &[String]) -> Result<Router> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .context(format!("💀 '{origin}' is not a valid CORS origin"))
        })
        .collect::<Result<Vec<_>>>()?;

    // -- 🔒 credentials rule out wildcards, so methods and headers are mirrored from the preflight
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Ok(Router::new()
        .route("/bestOffersByHotel", get(best_offers_by_hotel))
        .route("/hotels/{hotel_id}/offers", get(hotel_offers))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn best_offers_by_hotel(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<BestHotelOffer>>, ApiError> {
    let params = OfferSearchParams::from_query_pairs(&pairs)?;
    let body = best_offers_query(&params, state.best_offers_bucket_size);
    debug!("🔍 best offers query: {body}");
    let response = state
        .store
        .search(&state.index, &body)
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(best_offers_from_response(response)?))
}

async fn hotel_offers(
    State(state): State<AppState>,
    Path(hotel_id): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<GetHotelOffersResponse>, ApiError> {
    let hotel_id: HotelId = hotel_id
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidHotelId(hotel_id.clone()))?;
    let params = OfferSearchParams::from_query_pairs(&pairs)?;
    let body = hotel_offers_query(hotel_id, &params, state.hotel_offers_page_size);
    debug!("🔍 hotel {hotel_id} offers query: {body}");
    let response = state
        .store
        .search(&state.index, &body)
        .await
        .map_err(ApiError::Store)?;
    Ok(Json(hotel_offers_from_response(hotel_id, response)?))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            error!("💀 health check: {err:#}");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        }
    }
}

/// 🚀 Bind and serve until Ctrl-C.
pub async fn serve_until_shutdown(router: Router, bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .context(format!("💀 Could not listen on '{bind_address}'. Is the port already taken?"))?;
    info!(
        "🌐 Query service listening on {}",
        listener.local_addr().context("💀 The listener forgot its own address")?
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("💀 The HTTP server stopped unexpectedly")?;
    info!("🏁 Query service shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("💀 Could not listen for Ctrl-C ({err}); shutting down now");
        return;
    }
    info!("🛑 Ctrl-C received, finishing in-flight requests...");
}
