use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, error};

use crate::gate::rate_limit_message;
use crate::tracker::{QuotaError, UsageReport};

use super::types::{CheckResponse, ConsumeResponse, ErrorResponse, FeatureRequest, GetUsageResponse};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub async fn consume(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<FeatureRequest>,
) -> ApiResult<ConsumeResponse> {
    let feature = validate_feature(&request.feature)?;
    let decision = state.tracker.try_consume(feature).map_err(quota_error)?;

    debug!(
        feature,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "consume requested"
    );

    Ok(Json(ConsumeResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        reset_in_ms: decision.reset_in_ms,
        message: (!decision.allowed).then(|| rate_limit_message(decision.reset_in_ms)),
    }))
}

pub async fn check(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<FeatureRequest>,
) -> ApiResult<CheckResponse> {
    let feature = validate_feature(&request.feature)?;
    let status = state.tracker.status(feature).map_err(quota_error)?;

    Ok(Json(CheckResponse {
        limited: status.limited,
        remaining: status.remaining,
        reset_in_ms: status.reset_in_ms,
    }))
}

pub async fn get_usage(
    State(state): State<Arc<ApiState>>,
    Path(feature): Path<String>,
) -> ApiResult<GetUsageResponse> {
    let feature = validate_feature(&feature)?;
    let usage = state.tracker.usage(feature).map_err(quota_error)?;
    Ok(Json(GetUsageResponse { usage }))
}

pub async fn usage_report(State(state): State<Arc<ApiState>>) -> ApiResult<UsageReport> {
    Ok(Json(state.tracker.report()))
}

pub async fn health_check(State(state): State<Arc<ApiState>>) -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "study-quota-tracker",
        "tick_interval_ms": state.config.tick_interval_ms,
        "features": state.tracker.features(),
    })))
}

fn validate_feature(feature: &str) -> Result<&str, (StatusCode, Json<ErrorResponse>)> {
    let trimmed = feature.trim();
    if trimmed.is_empty() {
        return Err(bad_request("invalid_feature", "feature cannot be empty"));
    }
    Ok(trimmed)
}

fn quota_error(err: QuotaError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        QuotaError::UnknownFeature(feature) => not_found(
            "unknown_feature",
            &format!("feature {feature} has no configured quota"),
        ),
        other => internal_error(other),
    }
}

fn bad_request(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn not_found(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %err, "quota API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}
