use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{NewScan, ScanRecord, ScanStatus, error_payload},
    repositories::ScanRepository,
};

/// 服务重启时遗留扫描的错误消息
pub const INTERRUPTED_MESSAGE: &str = "interrupted by service restart";

/// 扫描生命周期跟踪
///
/// 扫描记录的唯一写入口：`begin` 创建 running 记录，
/// 之后只能由 `complete` 或 `fail` 写入一次终态。
#[derive(Debug, Clone)]
pub struct ScanTracker {
    repository: Arc<dyn ScanRepository>,
}

impl ScanTracker {
    pub fn new(repository: Arc<dyn ScanRepository>) -> Self {
        Self { repository }
    }

    /// 创建 running 状态的扫描记录
    pub async fn begin(&self, scan: &NewScan) -> AppResult<ScanRecord> {
        let record = self.repository.insert(scan).await?;
        info!(
            scan_id = %record.scan_id,
            user_id = %record.user_id,
            model_type = %record.model_type,
            model_name = %record.model_name,
            "扫描已创建"
        );
        Ok(record)
    }

    /// 标记完成，保存 garak 标准输出
    pub async fn complete(&self, scan_id: Uuid, raw_output: String) -> AppResult<()> {
        self.finish(scan_id, ScanStatus::Completed, JsonValue::String(raw_output))
            .await
    }

    /// 标记失败，保存 `{"error": message}`
    pub async fn fail(&self, scan_id: Uuid, message: &str) -> AppResult<()> {
        self.finish(scan_id, ScanStatus::Failed, error_payload(message))
            .await
    }

    async fn finish(&self, scan_id: Uuid, status: ScanStatus, results: JsonValue) -> AppResult<()> {
        if !status.is_terminal() {
            return Err(AppError::validation(format!(
                "扫描 {} 只能转为终态，收到 {}",
                scan_id, status
            )));
        }

        let updated = self
            .repository
            .finish_running(scan_id, status, &results)
            .await?;

        if !updated {
            warn!(%scan_id, %status, "扫描不处于running状态，忽略终态写入");
            return Err(AppError::validation(format!(
                "扫描 {} 已处于终态或不存在",
                scan_id
            )));
        }

        info!(%scan_id, %status, "扫描已结束");
        Ok(())
    }

    /// 查询属于该用户的扫描，其他用户的记录同样视为不存在
    pub async fn get(&self, scan_id: Uuid, owner: Uuid) -> AppResult<ScanRecord> {
        self.repository
            .find_for_owner(scan_id, owner)
            .await?
            .ok_or_else(|| AppError::not_found("Scan not found"))
    }

    /// 列出该用户的全部扫描
    pub async fn list(&self, owner: Uuid) -> AppResult<Vec<ScanRecord>> {
        self.repository.list_for_owner(owner).await
    }

    /// 将上次进程遗留的 running 扫描标记为失败
    pub async fn recover_interrupted(&self) -> AppResult<u64> {
        let count = self
            .repository
            .fail_all_running(&error_payload(INTERRUPTED_MESSAGE))
            .await?;
        if count > 0 {
            warn!(count, "已将上次运行遗留的扫描标记为失败");
        } else {
            info!("没有需要恢复的扫描");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryScanRepository;

    fn tracker() -> ScanTracker {
        ScanTracker::new(Arc::new(MemoryScanRepository::new()))
    }

    fn new_scan(user_id: Uuid) -> NewScan {
        NewScan {
            scan_id: Uuid::new_v4(),
            user_id,
            model_type: "test".to_string(),
            model_name: "m1".to_string(),
            probe_list: vec!["dan.DAN".to_string()],
            report_name: "report".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ownership_isolation() {
        let tracker = tracker();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let scan = new_scan(alice);
        tracker.begin(&scan).await.unwrap();

        assert!(tracker.get(scan.scan_id, alice).await.is_ok());

        let err = tracker.get(scan.scan_id, bob).await.unwrap_err();
        let missing = tracker.get(Uuid::new_v4(), bob).await.unwrap_err();
        // 他人的记录与不存在的记录不可区分
        assert_eq!(err.to_string(), missing.to_string());

        assert_eq!(tracker.list(alice).await.unwrap().len(), 1);
        assert!(tracker.list(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_stores_raw_output() {
        let tracker = tracker();
        let scan = new_scan(Uuid::new_v4());
        tracker.begin(&scan).await.unwrap();

        tracker
            .complete(scan.scan_id, "probe output\n".to_string())
            .await
            .unwrap();

        let record = tracker.get(scan.scan_id, scan.user_id).await.unwrap();
        assert_eq!(record.status, ScanStatus::Completed);
        assert_eq!(
            record.results,
            Some(JsonValue::String("probe output\n".to_string()))
        );
    }

    #[tokio::test]
    async fn test_transitions_are_one_way() {
        let tracker = tracker();
        let scan = new_scan(Uuid::new_v4());
        tracker.begin(&scan).await.unwrap();

        tracker.fail(scan.scan_id, "model unreachable").await.unwrap();
        assert!(tracker.complete(scan.scan_id, String::new()).await.is_err());
        assert!(tracker.fail(scan.scan_id, "again").await.is_err());

        let record = tracker.get(scan.scan_id, scan.user_id).await.unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(record.results, Some(error_payload("model unreachable")));
    }

    #[tokio::test]
    async fn test_finish_requires_terminal_status() {
        let tracker = tracker();
        let scan = new_scan(Uuid::new_v4());
        tracker.begin(&scan).await.unwrap();

        let result = tracker
            .finish(scan.scan_id, ScanStatus::Running, JsonValue::Null)
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let record = tracker.get(scan.scan_id, scan.user_id).await.unwrap();
        assert_eq!(record.status, ScanStatus::Running);
        assert!(record.results.is_none());
    }

    #[tokio::test]
    async fn test_recover_interrupted() {
        let tracker = tracker();
        let finished = new_scan(Uuid::new_v4());
        let stale = new_scan(Uuid::new_v4());
        tracker.begin(&finished).await.unwrap();
        tracker.begin(&stale).await.unwrap();
        tracker
            .complete(finished.scan_id, "ok".to_string())
            .await
            .unwrap();

        assert_eq!(tracker.recover_interrupted().await.unwrap(), 1);

        let record = tracker.get(stale.scan_id, stale.user_id).await.unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(record.results, Some(error_payload(INTERRUPTED_MESSAGE)));

        let record = tracker.get(finished.scan_id, finished.user_id).await.unwrap();
        assert_eq!(record.status, ScanStatus::Completed);
    }
}
