//! HTTP surface
//!
//! `GET /nutritional-info` scales a record by count or weight,
//! `GET /nutritional-data` returns the stored record as is, and `/health` and
//! `/metrics` report on the process.

use crate::{HealthChecker, HealthLevel, NutritionError, NutritionService, ScaleInput};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub const MISSING_PARAMS_MESSAGE: &str = "Please provide foodItem and either count or weight";
pub const MISSING_FOOD_ITEM_MESSAGE: &str = "Please provide foodItem";
pub const MACRO_ERROR_MESSAGE: &str = "Error calculating macro data";
pub const DATA_ERROR_MESSAGE: &str = "Error fetching nutritional data";

#[derive(Clone)]
pub struct AppState {
    pub service: NutritionService,
    pub health: Arc<HealthChecker>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionQuery {
    pub food_item: Option<String>,
    pub count: Option<String>,
    pub weight: Option<String>,
}

/// Failures as seen by HTTP clients: their fault, or ours.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal {
        error: NutritionError,
        message: &'static str,
    },
}

impl ApiError {
    fn from_service(error: NutritionError, message: &'static str) -> Self {
        if error.is_client_error() {
            ApiError::BadRequest(error.to_string())
        } else {
            ApiError::Internal { error, message }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal { error, message } => {
                error!(kind = error.kind(), "{}: {}", message, error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn nutritional_info(
    State(state): State<AppState>,
    Query(query): Query<NutritionQuery>,
) -> Result<Response, ApiError> {
    let count = present(query.count.as_deref());
    let weight = present(query.weight.as_deref());

    let food_item = match present(query.food_item.as_deref()) {
        Some(food_item) if count.is_some() || weight.is_some() => food_item,
        _ => return Err(ApiError::BadRequest(MISSING_PARAMS_MESSAGE.to_string())),
    };

    let scale = ScaleInput::from_query(count, weight)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let result = state
        .service
        .calculate_macro_data(food_item, scale)
        .await
        .map_err(|e| ApiError::from_service(e, MACRO_ERROR_MESSAGE))?;

    Ok(Json(result).into_response())
}

async fn nutritional_data(
    State(state): State<AppState>,
    Query(query): Query<NutritionQuery>,
) -> Result<Response, ApiError> {
    let food_item = present(query.food_item.as_deref())
        .ok_or_else(|| ApiError::BadRequest(MISSING_FOOD_ITEM_MESSAGE.to_string()))?;

    let record = state
        .service
        .fetch_nutritional_data(food_item)
        .await
        .map_err(|e| ApiError::from_service(e, DATA_ERROR_MESSAGE))?;

    Ok(Json(record).into_response())
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state.health.check_health().await;
    let code = match status.overall {
        HealthLevel::Critical => StatusCode::SERVICE_UNAVAILABLE,
        HealthLevel::Healthy | HealthLevel::Warning => StatusCode::OK,
    };
    (code, Json(status)).into_response()
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/nutritional-info", get(nutritional_info))
        .route("/nutritional-data", get(nutritional_data))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

/// Serve `app` on `host:port` until `shutdown` resolves.
pub async fn serve<F>(app: Router, host: &str, port: u16, shutdown: F) -> Result<(), NutritionError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind(host, port).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind a listener. `host` may be a hostname, an IPv4 address or a bare IPv6
/// address.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, NutritionError> {
    Ok(TcpListener::bind((host, port)).await?)
}
