use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};

use crate::{
    error::{AppError, AppResult},
    handlers::{AppState, CurrentUser, parse_scan_id},
    models::ScanStatus,
};

/// garak 报告文件种类
#[derive(Debug, Clone, Copy)]
enum ReportKind {
    Jsonl,
    Html,
}

impl ReportKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Jsonl => ".report.jsonl",
            Self::Html => ".report.html",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Self::Jsonl => "application/jsonlines",
            Self::Html => "text/html",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Html => "html",
        }
    }
}

async fn serve_report(
    app_state: &AppState,
    user_id: uuid::Uuid,
    raw_scan_id: &str,
    kind: ReportKind,
) -> AppResult<Response> {
    let scan_id = parse_scan_id(raw_scan_id)?;
    let record = app_state.scans.tracker().get(scan_id, user_id).await?;

    if record.status != ScanStatus::Completed {
        return Err(AppError::not_found("Scan logs not available"));
    }

    let path = app_state
        .garak
        .config()
        .report_path(&record.report_name, kind.suffix());

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::file_not_found(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(%scan_id, path = %path.display(), size = content.len(), "返回报告文件");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}.{}\"",
                scan_id,
                kind.extension()
            ),
        )
        .body(Body::from(content))
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}

/// 下载扫描的 jsonl 报告
#[utoipa::path(
    get,
    path = "/scan_logs/{scan_id}",
    tag = "reports",
    params(("scan_id" = String, Path, description = "扫描ID")),
    responses(
        (status = 200, description = "jsonl 报告文件", content_type = "application/jsonlines", body = String),
        (status = 401, description = "未认证"),
        (status = 404, description = "扫描未完成或报告文件不存在")
    ),
    security(("bearer" = []))
)]
pub async fn scan_logs(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(scan_id): Path<String>,
) -> Result<Response, AppError> {
    serve_report(&app_state, user.id, &scan_id, ReportKind::Jsonl).await
}

/// 下载扫描的 HTML 报告
#[utoipa::path(
    get,
    path = "/scan_logs_html/{scan_id}",
    tag = "reports",
    params(("scan_id" = String, Path, description = "扫描ID")),
    responses(
        (status = 200, description = "HTML 报告文件", content_type = "text/html", body = String),
        (status = 401, description = "未认证"),
        (status = 404, description = "扫描未完成或报告文件不存在")
    ),
    security(("bearer" = []))
)]
pub async fn scan_logs_html(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(scan_id): Path<String>,
) -> Result<Response, AppError> {
    serve_report(&app_state, user.id, &scan_id, ReportKind::Html).await
}
