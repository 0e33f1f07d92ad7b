use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    error::AppError,
    handlers::{AppState, CurrentUser, parse_scan_id},
    models::{NewScanResponse, ScanRecord, ScanRequest, ScanStatusView, ScanSummary},
    response::ApiResponse,
};

/// 提交新扫描，后台执行，立即返回扫描ID
#[utoipa::path(
    post,
    path = "/new_scan",
    tag = "scans",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "扫描已启动", body = NewScanResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未认证")
    ),
    security(("bearer" = []))
)]
pub async fn new_scan(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ApiResponse<NewScanResponse>>, AppError> {
    let scan_id = app_state.scans.submit(request, user.id).await?;

    Ok(Json(ApiResponse::success(NewScanResponse {
        message: "Scan started successfully".to_string(),
        scan_id,
    })))
}

/// 当前用户的全部扫描记录
#[utoipa::path(
    get,
    path = "/user/scans",
    tag = "scans",
    responses(
        (status = 200, description = "扫描记录列表", body = Vec<ScanRecord>),
        (status = 401, description = "未认证")
    ),
    security(("bearer" = []))
)]
pub async fn user_scans(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<ScanRecord>>>, AppError> {
    let records = app_state.scans.tracker().list(user.id).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// 单个扫描的状态
#[utoipa::path(
    get,
    path = "/scan_status/{scan_id}",
    tag = "scans",
    params(("scan_id" = String, Path, description = "扫描ID")),
    responses(
        (status = 200, description = "扫描状态", body = ScanStatusView),
        (status = 401, description = "未认证"),
        (status = 404, description = "扫描不存在或不属于当前用户")
    ),
    security(("bearer" = []))
)]
pub async fn scan_status(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(scan_id): Path<String>,
) -> Result<Json<ApiResponse<ScanStatusView>>, AppError> {
    let scan_id = parse_scan_id(&scan_id)?;
    let record = app_state.scans.tracker().get(scan_id, user.id).await?;
    Ok(Json(ApiResponse::success(ScanStatusView::from(&record))))
}

/// 当前用户全部扫描的状态概要（含创建时间）
#[utoipa::path(
    get,
    path = "/all_scan_status",
    tag = "scans",
    responses(
        (status = 200, description = "扫描概要列表", body = Vec<ScanSummary>),
        (status = 401, description = "未认证")
    ),
    security(("bearer" = []))
)]
pub async fn all_scan_status(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<Vec<ScanSummary>>>, AppError> {
    let summaries = app_state
        .scans
        .tracker()
        .list(user.id)
        .await?
        .into_iter()
        .map(ScanSummary::from)
        .collect();

    Ok(Json(ApiResponse::success(summaries)))
}
