pub mod auth;
pub mod probes;
pub mod reports;
pub mod scans;

pub use auth::{CurrentUser, register, token};
pub use probes::list_probes;
pub use reports::{scan_logs, scan_logs_html};
pub use scans::{all_scan_status, new_scan, scan_status, user_scans};

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::Config,
    database::Database,
    error::{AppError, AppResult},
    repositories::{
        MemoryScanRepository, MemoryUserRepository, PgScanRepository, PgUserRepository,
        ScanRepository, UserRepository,
    },
    services::{AuthService, GarakRunner, ScanService, ScanTracker},
};

/// 应用状态
#[derive(Debug, Clone)]
pub struct AppState {
    pub database: Option<Database>,
    pub scans: ScanService,
    pub auth: AuthService,
    pub garak: Arc<GarakRunner>,
    pub config: Config,
}

impl AppState {
    /// 组装服务；没有数据库时使用内存存储
    pub fn new(config: Config, database: Option<Database>) -> Self {
        let (scan_repo, user_repo): (Arc<dyn ScanRepository>, Arc<dyn UserRepository>) =
            match &database {
                Some(db) => (
                    Arc::new(PgScanRepository::new(db.pool().clone())),
                    Arc::new(PgUserRepository::new(db.pool().clone())),
                ),
                None => {
                    tracing::warn!("数据库不可用，扫描记录和用户将保存在内存中，重启后丢失");
                    (
                        Arc::new(MemoryScanRepository::new()),
                        Arc::new(MemoryUserRepository::new()),
                    )
                }
            };

        let garak = Arc::new(GarakRunner::new(config.garak.clone()));
        let scans = ScanService::new(ScanTracker::new(scan_repo), garak.clone());
        let token_ttl = chrono::Duration::minutes(config.auth.token_ttl_minutes as i64);
        let auth = AuthService::new(user_repo, token_ttl);

        Self {
            database,
            scans,
            auth,
            garak,
            config,
        }
    }
}

/// 解析路径中的扫描ID，格式错误与不存在同样返回 404
pub(crate) fn parse_scan_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("Scan not found"))
}
