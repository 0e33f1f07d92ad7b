use crate::{
    models::{
        MessageResponse, NewScanResponse, ProbeCatalog, ProbeEntry, RegisterRequest, ScanRecord,
        ScanRequest, ScanStatus, ScanStatusView, ScanSummary, TokenRequest, TokenResponse,
    },
    response::ApiResponse,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// 注册 bearer 令牌认证方式
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("opaque")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // 认证API
        crate::handlers::auth::register,
        crate::handlers::auth::token,
        // 探针API
        crate::handlers::probes::list_probes,
        // 扫描管理API
        crate::handlers::scans::new_scan,
        crate::handlers::scans::user_scans,
        crate::handlers::scans::scan_status,
        crate::handlers::scans::all_scan_status,
        // 报告下载API
        crate::handlers::reports::scan_logs,
        crate::handlers::reports::scan_logs_html,
    ),
    components(
        schemas(
            // 认证相关模型
            RegisterRequest,
            TokenRequest,
            TokenResponse,
            MessageResponse,
            // 探针相关模型
            ProbeCatalog,
            ProbeEntry,
            // 扫描相关模型
            ScanRequest,
            ScanRecord,
            ScanStatus,
            ScanStatusView,
            ScanSummary,
            NewScanResponse,
            // 通用响应模型
            ApiResponse<TokenResponse>,
            ApiResponse<MessageResponse>,
            ApiResponse<ProbeCatalog>,
            ApiResponse<NewScanResponse>,
            ApiResponse<ScanStatusView>,
            ApiResponse<Vec<ScanRecord>>,
            ApiResponse<Vec<ScanSummary>>,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "用户注册与访问令牌"),
        (name = "probes", description = "garak 探针目录"),
        (name = "scans", description = "扫描的提交、状态查询与历史记录"),
        (name = "reports", description = "扫描报告文件下载")
    ),
    info(
        title = "Garak Scan Backend API",
        version = "1.0.0",
        description = "garak LLM 漏洞扫描后端 REST API 文档",
        license(
            name = "CC BY-NC-SA 4.0",
            url = "https://creativecommons.org/licenses/by-nc-sa/4.0/"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "开发环境")
    )
)]
pub struct ApiDoc;
