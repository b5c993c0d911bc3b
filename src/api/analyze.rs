use crate::api::AppState;
use crate::error::ApiError;
use crate::models::{AnalysisRecord, AnalysisReport, AnalysisSummary, AnalyzeRequest, CommonResponse, HistoryQuery};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze_code))
        .route("/api/v1/analyze", post(analyze_code))
        .route("/api/v1/analyze/history", get(get_history))
        .route(
            "/api/v1/analyze/:analysis_id",
            get(get_analysis).delete(delete_analysis),
        )
}

/// 提交代码进行安全分析，成功时直接返回规范化后的报告
pub async fn analyze_code(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let Json(request) = payload.map_err(|e| state.reject(e.body_text()))?;

    let report = state
        .service
        .analyze(&request.code)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(report))
}

/// 分页获取分析历史
pub async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<CommonResponse<Vec<AnalysisSummary>>>, ApiError> {
    let Query(query) = query.map_err(|e| state.reject(e.body_text()))?;

    let history = state
        .service
        .list_history(query.limit, query.offset)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(CommonResponse::ok(
        "Analysis history retrieved successfully",
        history,
    )))
}

/// 获取单条分析及其全部漏洞与修复
pub async fn get_analysis(
    State(state): State<AppState>,
    analysis_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<CommonResponse<AnalysisRecord>>, ApiError> {
    let Path(analysis_id) = analysis_id.map_err(|e| invalid_id(&state, e))?;

    let record = state
        .service
        .get_by_id(analysis_id)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(CommonResponse::ok("Analysis retrieved successfully", record)))
}

pub async fn delete_analysis(
    State(state): State<AppState>,
    analysis_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<CommonResponse<Value>>, ApiError> {
    let Path(analysis_id) = analysis_id.map_err(|e| invalid_id(&state, e))?;

    state
        .service
        .delete_by_id(analysis_id)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(CommonResponse::ok(
        "Analysis deleted successfully",
        serde_json::json!({ "analysis_id": analysis_id }),
    )))
}

fn invalid_id(state: &AppState, rejection: PathRejection) -> ApiError {
    log::debug!("Rejected analysis id: {}", rejection.body_text());
    state.reject("analysis_id: must be a valid UUID")
}
