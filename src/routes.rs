use crate::handlers::{
    AppState, all_scan_status, list_probes, new_scan, register, scan_logs, scan_logs_html,
    scan_status, token, user_scans,
};
use axum::{
    Router,
    routing::{get, post},
};

/// 创建API路由
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        // 用户与令牌
        .route("/register", post(register))
        .route("/token", post(token))
        // 探针目录
        .route("/probes", get(list_probes))
        // 扫描管理
        .route("/new_scan", post(new_scan))
        .route("/user/scans", get(user_scans))
        .route("/scan_status/{scan_id}", get(scan_status))
        .route("/all_scan_status", get(all_scan_status))
        // 报告下载
        .route("/scan_logs/{scan_id}", get(scan_logs))
        .route("/scan_logs_html/{scan_id}", get(scan_logs_html))
}
