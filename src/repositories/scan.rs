use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::ScanRepository;
use crate::{
    error::{AppError, AppResult},
    models::{NewScan, ScanRecord, ScanStatus},
};

const SCAN_COLUMNS: &str = "scan_id, user_id, model_type, model_name, probe_list, status, \
                            results, report_name, created_at, finished_at";

/// 扫描记录仓库（Postgres）
#[derive(Debug, Clone)]
pub struct PgScanRepository {
    pool: PgPool,
}

impl PgScanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanRepository for PgScanRepository {
    async fn insert(&self, scan: &NewScan) -> AppResult<ScanRecord> {
        let query = format!(
            r#"
            INSERT INTO scan_history
            (scan_id, user_id, model_type, model_name, probe_list, status, results, report_name, created_at)
            VALUES ($1, $2, $3, $4, $5, 'running', NULL, $6, NOW())
            RETURNING {}
            "#,
            SCAN_COLUMNS
        );

        let record = sqlx::query_as::<_, ScanRecord>(&query)
            .bind(scan.scan_id)
            .bind(scan.user_id)
            .bind(&scan.model_type)
            .bind(&scan.model_name)
            .bind(&scan.probe_list)
            .bind(&scan.report_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::store("创建扫描记录失败", e))?;

        Ok(record)
    }

    async fn finish_running(
        &self,
        scan_id: Uuid,
        status: ScanStatus,
        results: &JsonValue,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scan_history
            SET status = $2, results = $3, finished_at = NOW()
            WHERE scan_id = $1 AND status = 'running'
            "#,
        )
        .bind(scan_id)
        .bind(status)
        .bind(results)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::store("更新扫描状态失败", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_for_owner(&self, scan_id: Uuid, user_id: Uuid) -> AppResult<Option<ScanRecord>> {
        let query = format!(
            "SELECT {} FROM scan_history WHERE scan_id = $1 AND user_id = $2",
            SCAN_COLUMNS
        );

        let record = sqlx::query_as::<_, ScanRecord>(&query)
            .bind(scan_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::store("查询扫描记录失败", e))?;

        Ok(record)
    }

    async fn list_for_owner(&self, user_id: Uuid) -> AppResult<Vec<ScanRecord>> {
        let query = format!(
            "SELECT {} FROM scan_history WHERE user_id = $1 ORDER BY created_at ASC",
            SCAN_COLUMNS
        );

        let records = sqlx::query_as::<_, ScanRecord>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::store("查询扫描列表失败", e))?;

        Ok(records)
    }

    async fn fail_all_running(&self, results: &JsonValue) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE scan_history
            SET status = 'failed', results = $1, finished_at = NOW()
            WHERE status = 'running'
            "#,
        )
        .bind(results)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::store("恢复遗留扫描失败", e))?;

        Ok(result.rows_affected())
    }
}
