use std::{collections::HashMap, sync::Arc, time::Duration};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::{RwLock, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ALL_PROBES, NewScan, ScanRequest},
    services::{
        garak_runner::{GarakError, GarakRunner},
        scan_tracker::ScanTracker,
    },
};

static PROBE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.]+$").expect("探针名正则无效"));

static REPORT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+$").expect("报告名正则无效"));

/// 校验请求并补全缺省值
///
/// 模型参数会作为命令行参数传给 garak，不允许以 `-` 开头；
/// 报告名用作文件名，只允许单个路径分量。
pub fn prepare_scan(request: ScanRequest, owner: Uuid, scan_id: Uuid) -> AppResult<NewScan> {
    let ScanRequest {
        model_type,
        model_name,
        probe_list,
        report_name,
    } = request;

    if model_type.trim().is_empty() || model_name.trim().is_empty() {
        return Err(AppError::validation("model_type and model_name are required"));
    }
    if model_type.starts_with('-') || model_name.starts_with('-') {
        return Err(AppError::validation(
            "model_type and model_name must not start with '-'",
        ));
    }

    let probe_list = match probe_list {
        Some(list) if !list.is_empty() => list,
        _ => vec![ALL_PROBES.to_string()],
    };
    if let Some(bad) = probe_list.iter().find(|p| !PROBE_NAME.is_match(p)) {
        return Err(AppError::validation(format!("Invalid probe name: {}", bad)));
    }

    let report_name = match report_name {
        Some(name) if !name.is_empty() => {
            if !REPORT_NAME.is_match(&name)
                || name.starts_with('-')
                || name == "."
                || name == ".."
            {
                return Err(AppError::validation(format!("Invalid report name: {}", name)));
            }
            name
        }
        _ => scan_id.to_string(),
    };

    Ok(NewScan {
        scan_id,
        user_id: owner,
        model_type,
        model_name,
        probe_list,
        report_name,
    })
}

/// 执行中的扫描句柄
#[derive(Debug, Clone)]
struct InFlightScan {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// 扫描提交与后台执行
///
/// 提交时先创建 running 记录，再把 garak 调用放到后台任务；
/// 后台任务在信号量许可下运行，结束后写入终态并通知等待者。
#[derive(Debug, Clone)]
pub struct ScanService {
    tracker: ScanTracker,
    runner: Arc<GarakRunner>,
    /// 控制同时运行的 garak 进程数
    permits: Arc<Semaphore>,
    in_flight: Arc<RwLock<HashMap<Uuid, InFlightScan>>>,
}

impl ScanService {
    pub fn new(tracker: ScanTracker, runner: Arc<GarakRunner>) -> Self {
        let permits = Arc::new(Semaphore::new(runner.config().max_concurrent_scans));
        Self {
            tracker,
            runner,
            permits,
            in_flight: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn tracker(&self) -> &ScanTracker {
        &self.tracker
    }

    /// 提交扫描，立即返回扫描ID
    pub async fn submit(&self, request: ScanRequest, owner: Uuid) -> AppResult<Uuid> {
        let scan = prepare_scan(request, owner, Uuid::new_v4())?;
        let scan_id = scan.scan_id;

        // 记录必须在后台任务调度前落库
        self.tracker.begin(&scan).await?;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.in_flight.write().await.insert(
            scan_id,
            InFlightScan {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.execute(scan, cancel).await;
            let _ = done_tx.send(true);
            service.in_flight.write().await.remove(&scan_id);
        });

        Ok(scan_id)
    }

    async fn execute(&self, scan: NewScan, cancel: CancellationToken) {
        let scan_id = scan.scan_id;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(GarakError::Cancelled),
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(_permit) => {
                    debug!(%scan_id, "获得执行许可，启动garak");
                    self.runner
                        .run_probe(
                            &scan.probe_list,
                            &scan.model_type,
                            &scan.model_name,
                            &scan.report_name,
                            &self.runner.config().extra_args,
                            &cancel,
                        )
                        .await
                }
                Err(_) => Err(GarakError::Cancelled),
            },
        };

        let recorded = match outcome {
            Ok(stdout) => self.tracker.complete(scan_id, stdout).await,
            Err(e) => {
                warn!(%scan_id, "扫描失败: {}", e);
                self.tracker.fail(scan_id, &e.failure_message()).await
            }
        };

        if let Err(e) = recorded {
            error!(%scan_id, "写入扫描结果失败: {}", e);
        }
    }

    /// 等待扫描的后台任务结束；不在执行中的扫描立即返回
    pub async fn wait(&self, scan_id: Uuid) {
        let done = self
            .in_flight
            .read()
            .await
            .get(&scan_id)
            .map(|scan| scan.done.clone());

        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// 取消执行中的扫描，返回是否找到该扫描
    pub async fn cancel(&self, scan_id: Uuid) -> bool {
        match self.in_flight.read().await.get(&scan_id) {
            Some(scan) => {
                info!(%scan_id, "取消扫描");
                scan.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// 当前执行中（含等待许可）的扫描数
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.read().await.len()
    }

    /// 空闲的执行许可数
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// 取消全部执行中的扫描，最多等待 `grace` 让它们写入失败状态
    pub async fn shutdown(&self, grace: Duration) {
        let scans: Vec<(Uuid, InFlightScan)> = self
            .in_flight
            .read()
            .await
            .iter()
            .map(|(id, scan)| (*id, scan.clone()))
            .collect();

        if scans.is_empty() {
            return;
        }

        info!(count = scans.len(), "停止执行中的扫描");
        for (_, scan) in &scans {
            scan.cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + grace;
        for (scan_id, mut scan) in scans {
            if tokio::time::timeout_at(deadline, scan.done.wait_for(|finished| *finished))
                .await
                .is_err()
            {
                warn!(%scan_id, "等待扫描结束超时");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        models::{ScanStatus, error_payload},
        repositories::MemoryScanRepository,
        test_support::{FakeGarak, WRITE_REPORTS, fake_garak},
    };
    use serde_json::Value as JsonValue;

    fn service(fake: &FakeGarak) -> ScanService {
        let tracker = ScanTracker::new(Arc::new(MemoryScanRepository::new()));
        ScanService::new(tracker, Arc::new(GarakRunner::new(fake.config.clone())))
    }

    fn request(probes: &[&str]) -> ScanRequest {
        ScanRequest {
            model_type: "test".to_string(),
            model_name: "m1".to_string(),
            probe_list: Some(probes.iter().map(|p| p.to_string()).collect()),
            report_name: None,
        }
    }

    #[test]
    fn test_prepare_scan_defaults() {
        let owner = Uuid::new_v4();
        let scan_id = Uuid::new_v4();
        let scan = prepare_scan(request(&[]), owner, scan_id).unwrap();
        assert_eq!(scan.probe_list, vec!["all".to_string()]);
        assert_eq!(scan.report_name, scan_id.to_string());
        assert_eq!(scan.user_id, owner);
    }

    #[test]
    fn test_prepare_scan_rejects_bad_input() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();

        let mut missing = request(&["dan"]);
        missing.model_name = "  ".to_string();
        assert!(prepare_scan(missing, owner, id).is_err());

        let mut flag = request(&["dan"]);
        flag.model_type = "--config".to_string();
        assert!(prepare_scan(flag, owner, id).is_err());

        assert!(prepare_scan(request(&["dan;rm"]), owner, id).is_err());

        for name in ["../etc", "..", "a/b"] {
            let mut bad = request(&["dan"]);
            bad.report_name = Some(name.to_string());
            assert!(prepare_scan(bad, owner, id).is_err(), "{name}");
        }

        let mut ok = request(&["dan.DAN", "encoding"]);
        ok.report_name = Some("nightly-run.v2".to_string());
        assert_eq!(
            prepare_scan(ok, owner, id).unwrap().report_name,
            "nightly-run.v2"
        );
    }

    #[test]
    fn test_report_name_cannot_look_like_a_flag() {
        let owner = Uuid::new_v4();
        let id = Uuid::new_v4();

        for name in ["--config", "-v", "-"] {
            let mut flag = request(&["dan"]);
            flag.report_name = Some(name.to_string());
            let err = prepare_scan(flag, owner, id).unwrap_err();
            assert!(err.to_string().contains("Invalid report name"), "{name}");
        }

        // 中间的连字符不受影响
        let mut ok = request(&["dan"]);
        ok.report_name = Some("run-1".to_string());
        assert!(prepare_scan(ok, owner, id).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_request_creates_no_record() {
        let fake = fake_garak("exit 0\n");
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let mut bad = request(&["dan"]);
        bad.model_type.clear();
        assert!(service.submit(bad, owner).await.is_err());
        assert!(service.tracker().list(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_scan() {
        let fake = fake_garak(&format!("echo \"scan finished\"\n{}", WRITE_REPORTS));
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let scan_id = service.submit(request(&["dan.DAN"]), owner).await.unwrap();
        service.wait(scan_id).await;

        let record = service.tracker().get(scan_id, owner).await.unwrap();
        assert_eq!(record.status, ScanStatus::Completed);
        assert_eq!(
            record.results,
            Some(JsonValue::String("scan finished\n".to_string()))
        );
        assert!(
            fake.report_dir
                .join(format!("{}.report.jsonl", scan_id))
                .exists()
        );
        assert_eq!(service.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_scan_records_stderr() {
        let fake = fake_garak("echo \"model unreachable\" >&2\nexit 1\n");
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let scan_id = service.submit(request(&["dan.DAN"]), owner).await.unwrap();
        service.wait(scan_id).await;

        let record = service.tracker().get(scan_id, owner).await.unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(record.results, Some(error_payload("model unreachable")));
    }

    #[tokio::test]
    async fn test_timeout_marks_failed() {
        let mut fake = fake_garak("sleep 10\n");
        fake.config.timeout_secs = 1;
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let scan_id = service.submit(request(&[]), owner).await.unwrap();
        service.wait(scan_id).await;

        let record = service.tracker().get(scan_id, owner).await.unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(
            record.results,
            Some(error_payload(&GarakError::Timeout(1).to_string()))
        );
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut fake = fake_garak(
            "echo started >> __REPORT_DIR__/started\n\
             while [ ! -f __REPORT_DIR__/gate ]; do sleep 0.05; done\n",
        );
        fake.config.max_concurrent_scans = 1;
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let first = service.submit(request(&[]), owner).await.unwrap();
        let second = service.submit(request(&[]), owner).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let started = std::fs::read_to_string(fake.report_dir.join("started")).unwrap();
        assert_eq!(started.lines().count(), 1);
        // 等待许可的扫描同样处于 running
        let waiting = service.tracker().get(second, owner).await.unwrap();
        assert_eq!(waiting.status, ScanStatus::Running);
        assert_eq!(service.available_permits(), 0);

        std::fs::write(fake.report_dir.join("gate"), "").unwrap();
        service.wait(first).await;
        service.wait(second).await;

        let started = std::fs::read_to_string(fake.report_dir.join("started")).unwrap();
        assert_eq!(started.lines().count(), 2);
        for scan_id in [first, second] {
            let record = service.tracker().get(scan_id, owner).await.unwrap();
            assert_eq!(record.status, ScanStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_cancel_marks_failed() {
        let fake = fake_garak("sleep 10\n");
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let scan_id = service.submit(request(&[]), owner).await.unwrap();
        assert!(service.cancel(scan_id).await);
        service.wait(scan_id).await;

        let record = service.tracker().get(scan_id, owner).await.unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(
            record.results,
            Some(error_payload(&GarakError::Cancelled.to_string()))
        );
        assert!(!service.cancel(scan_id).await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_scans() {
        let fake = fake_garak("sleep 10\n");
        let service = service(&fake);
        let owner = Uuid::new_v4();

        let first = service.submit(request(&[]), owner).await.unwrap();
        let second = service.submit(request(&[]), owner).await.unwrap();
        service.shutdown(Duration::from_secs(5)).await;

        for scan_id in [first, second] {
            let record = service.tracker().get(scan_id, owner).await.unwrap();
            assert_eq!(record.status, ScanStatus::Failed);
        }
    }
}
