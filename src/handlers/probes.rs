use axum::{Json, extract::State};

use crate::{error::AppError, handlers::AppState, models::ProbeCatalog, response::ApiResponse};

/// 列出 garak 可用探针
#[utoipa::path(
    get,
    path = "/probes",
    tag = "probes",
    responses(
        (status = 200, description = "探针目录", body = ProbeCatalog),
        (status = 502, description = "garak 调用失败")
    )
)]
pub async fn list_probes(
    State(app_state): State<AppState>,
) -> Result<Json<ApiResponse<ProbeCatalog>>, AppError> {
    let catalog = app_state
        .garak
        .list_probes()
        .await
        .map_err(|e| AppError::external_tool(e.to_string()))?;

    tracing::info!(
        categories = catalog.probes.len(),
        probes = catalog.probe_count(),
        "获取探针列表成功"
    );

    Ok(Json(ApiResponse::success(catalog)))
}
