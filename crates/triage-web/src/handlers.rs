//! HTTP处理器

use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use triage_admin::TriageMetrics;
use triage_core::{AcuityLevel, EscalationEvent, IntakeRecord, TriageError, VitalSigns};
use triage_workflow::{QueueStats, TriageRequest, TriageService};
use uuid::Uuid;

/// 主诉最大长度
const MAX_COMPLAINT_LEN: usize = 2000;

/// 处理器共享状态
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: TriageService,
    pub metrics: Arc<TriageMetrics>,
}

impl AppState {
    pub fn new(service: TriageService, metrics: Arc<TriageMetrics>) -> Self {
        Self { service, metrics }
    }

    async fn refresh_gauges(&self) -> QueueStats {
        let stats = self.service.stats().await;
        self.metrics.observe_stats(&stats);
        stats
    }
}

/// 登记到达请求
#[derive(Debug, Deserialize)]
pub struct RegisterArrivalBody {
    pub patient_id: Uuid,
    pub chief_complaint: String,
}

/// 生命体征录入，记录时间取服务端时钟
#[derive(Debug, Default, Deserialize)]
pub struct VitalSignsInput {
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub heart_rate: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub recorded_by: Option<Uuid>,
}

impl VitalSignsInput {
    fn into_snapshot(self, recorded_at: chrono::DateTime<chrono::Utc>) -> VitalSigns {
        VitalSigns {
            systolic_bp: self.systolic_bp,
            diastolic_bp: self.diastolic_bp,
            heart_rate: self.heart_rate,
            respiratory_rate: self.respiratory_rate,
            temperature: self.temperature,
            oxygen_saturation: self.oxygen_saturation,
            recorded_at,
            recorded_by: self.recorded_by,
        }
    }
}

/// 分诊请求
#[derive(Debug, Default, Deserialize)]
pub struct TriageBody {
    pub vital_signs: Option<VitalSignsInput>,
    pub chief_complaint: Option<String>,
    pub override_level: Option<AcuityLevel>,
    pub assessed_by: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
    pub clinician_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct EscalationQueryParams {
    pub limit: Option<usize>,
}

/// 候诊列表响应
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub total: usize,
    pub records: Vec<IntakeRecord>,
}

fn validate_complaint(complaint: &str) -> ApiResult<()> {
    if complaint.chars().count() > MAX_COMPLAINT_LEN {
        return Err(TriageError::Validation(format!(
            "chief_complaint exceeds {} characters",
            MAX_COMPLAINT_LEN
        ))
        .into());
    }
    Ok(())
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Triage Queue API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.refresh_gauges().await;
    Json(state.metrics.health(&stats, state.service.now()))
}

/// Prometheus 指标
pub async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    state.refresh_gauges().await;
    let body = state.metrics.render()?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

/// 登记患者到达
pub async fn register_arrival(
    State(state): State<AppState>,
    Json(body): Json<RegisterArrivalBody>,
) -> ApiResult<impl IntoResponse> {
    validate_complaint(&body.chief_complaint)?;
    let record = state
        .service
        .register_arrival(body.patient_id, &body.chief_complaint)
        .await;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_intake(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<IntakeRecord>> {
    Ok(Json(state.service.get(id).await?))
}

/// 分诊 / 重新分诊
pub async fn triage_intake(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TriageBody>,
) -> ApiResult<Json<IntakeRecord>> {
    if let Some(complaint) = &body.chief_complaint {
        validate_complaint(complaint)?;
    }

    let now = state.service.now();
    let request = TriageRequest {
        vital_signs: body.vital_signs.map(|v| v.into_snapshot(now)),
        chief_complaint: body.chief_complaint,
        override_level: body.override_level,
        assessed_by: body.assessed_by,
    };

    let record = state.service.triage(id, request).await?;
    Ok(Json(record))
}

pub async fn cancel_intake(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBody>>,
) -> ApiResult<Json<IntakeRecord>> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(state.service.cancel(id, reason).await?))
}

pub async fn complete_intake(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<IntakeRecord>> {
    Ok(Json(state.service.complete(id).await?))
}

/// 接诊下一位；队列为空时返回 204
pub async fn claim_next(State(state): State<AppState>, Json(body): Json<ClaimBody>) -> ApiResult<Response> {
    match state.service.claim(body.clinician_id).await? {
        Some(record) => {
            if let Some(claimed_at) = record.claimed_at {
                state.metrics.record_claim(claimed_at - record.arrived_at);
            }
            Ok(Json(record).into_response())
        }
        None => {
            debug!("Claim by {} found an empty queue", body.clinician_id);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

pub async fn peek_next(State(state): State<AppState>) -> Response {
    match state.service.peek_next().await {
        Some(record) => Json(record).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// 按接诊顺序列出候诊记录
pub async fn list_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let records = state.service.waiting().await;
    Json(QueueResponse {
        total: records.len(),
        records,
    })
}

/// 列出尚未分诊的记录
pub async fn list_awaiting_triage(State(state): State<AppState>) -> Json<QueueResponse> {
    let records = state.service.awaiting_triage().await;
    Json(QueueResponse {
        total: records.len(),
        records,
    })
}

pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.refresh_gauges().await)
}

/// 升级事件历史，最新的在前
pub async fn list_escalations(
    State(state): State<AppState>,
    Query(params): Query<EscalationQueryParams>,
) -> Json<Vec<EscalationEvent>> {
    info!("Listing escalations with limit {:?}", params.limit);
    Json(state.service.escalations(params.limit).await)
}

/// 未匹配路由
pub async fn not_found() -> ApiError {
    ApiError(TriageError::NotFound("No such route".to_string()))
}
