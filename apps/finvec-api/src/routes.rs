use axum::{
	Json, Router,
	body::Body,
	extract::{Path, Query, Request, State},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use finvec_service::{
	CoverageReport, EnqueueRequest, EnqueueResponse, EnrichBatchRequest, EnrichBatchResponse,
	EnrichOneResponse, Error as ServiceError,
};
use finvec_worker::worker::{self, BatchReport};

use crate::state::AppState;

pub const HEADER_TENANT_ID: &str = "X-Finvec-Tenant-Id";

#[derive(Debug, Default, Deserialize)]
pub struct RunBatchParams {
	/// Capped at `worker.batch_size`, the size the stale-claim window is validated against.
	pub max_tasks: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			ServiceError::Provider { message } =>
				json_error(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message, None),
			ServiceError::Storage { message } =>
				json_error(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message, None),
		}
	}
}
impl From<finvec_worker::Error> for ApiError {
	fn from(err: finvec_worker::Error) -> Self {
		json_error(StatusCode::SERVICE_UNAVAILABLE, "WORKER_ERROR", err.to_string(), None)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/enrichment/transactions/{transaction_id}", post(enrich_one))
		.route("/v1/enrichment/batch", post(enrich_batch))
		.route("/v1/enrichment/coverage", get(coverage))
		.route("/v1/enrichment/enqueue", post(enqueue_missing))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/enrichment/run_batch", post(run_batch))
		.layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
		.with_state(state)
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn enrich_one(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(transaction_id): Path<Uuid>,
) -> Result<Json<EnrichOneResponse>, ApiError> {
	let tenant_id = required_tenant(&headers)?;
	let response = state.service.enrich_one(tenant_id, transaction_id).await?;

	Ok(Json(response))
}

async fn enrich_batch(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<EnrichBatchRequest>,
) -> Result<Json<EnrichBatchResponse>, ApiError> {
	let tenant_id = required_tenant(&headers)?;
	let response = state.service.enrich_batch(tenant_id, payload).await?;

	Ok(Json(response))
}

async fn coverage(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<CoverageReport>, ApiError> {
	let tenant_id = required_tenant(&headers)?;
	let response = state.service.coverage(tenant_id).await?;

	Ok(Json(response))
}

async fn enqueue_missing(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
	let tenant_id = required_tenant(&headers)?;
	let response = state.service.enqueue_missing(tenant_id, payload).await?;

	Ok(Json(response))
}

async fn run_batch(
	State(state): State<AppState>,
	Query(params): Query<RunBatchParams>,
) -> Result<Json<BatchReport>, ApiError> {
	let batch_size = state.worker.settings.batch_size;
	let max_tasks = params.max_tasks.unwrap_or(batch_size).min(batch_size);
	let report = worker::run_batch(&state.worker, max_tasks).await?;

	tracing::info!(
		claimed = report.claimed,
		processed = report.processed,
		failed = report.failed,
		requeued = report.requeued,
		"Admin-triggered enrichment batch finished."
	);

	Ok(Json(report))
}

async fn admin_auth_middleware(
	State(state): State<AppState>,
	req: Request<Body>,
	next: Next,
) -> Response {
	if let Some(expected) = state.admin_auth_token.as_deref()
		&& read_bearer_token(req.headers()) != Some(expected)
	{
		return json_error(
			StatusCode::UNAUTHORIZED,
			"UNAUTHORIZED",
			"A valid admin Bearer token is required.",
			None,
		)
		.into_response();
	}

	next.run(req).await
}

fn required_tenant(headers: &HeaderMap) -> Result<&str, ApiError> {
	headers
		.get(HEADER_TENANT_ID)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.ok_or_else(|| {
			json_error(
				StatusCode::BAD_REQUEST,
				"MISSING_TENANT",
				format!("{HEADER_TENANT_ID} header is required."),
				Some(vec![HEADER_TENANT_ID.to_string()]),
			)
		})
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}
