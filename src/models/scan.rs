use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// 未指定探针时使用的哨兵值
pub const ALL_PROBES: &str = "all";

/// 扫描状态
///
/// 只允许 `running → completed` 或 `running → failed`，没有排队态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "scan_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// 执行中
    Running,
    /// 已完成
    Completed,
    /// 失败
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 客户端提交的扫描请求
///
/// 扫描ID由服务端生成，请求体中的 `scan_id` 字段会被忽略。
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// 模型类型（garak `--model_type`）
    pub model_type: String,
    /// 模型名称（garak `--model_name`）
    pub model_name: String,
    /// 探针列表，缺省或为空时为 `["all"]`
    #[serde(default)]
    pub probe_list: Option<Vec<String>>,
    /// 报告名前缀，缺省为扫描ID
    #[serde(default)]
    pub report_name: Option<String>,
}

/// 校验并补全后的扫描任务
#[derive(Debug, Clone)]
pub struct NewScan {
    pub scan_id: Uuid,
    pub user_id: Uuid,
    pub model_type: String,
    pub model_name: String,
    pub probe_list: Vec<String>,
    pub report_name: String,
}

/// 扫描记录
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ScanRecord {
    pub scan_id: Uuid,
    /// 所属用户
    pub user_id: Uuid,
    pub model_type: String,
    pub model_name: String,
    pub probe_list: Vec<String>,
    pub status: ScanStatus,
    /// 成功时为 garak 标准输出，失败时为 `{"error": ...}`，执行中为空
    #[schema(value_type = Option<Object>)]
    pub results: Option<JsonValue>,
    /// 报告文件名前缀
    pub report_name: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanRecord {
    /// 由新任务构造初始记录（状态为 running）
    pub fn running(scan: &NewScan, created_at: DateTime<Utc>) -> Self {
        Self {
            scan_id: scan.scan_id,
            user_id: scan.user_id,
            model_type: scan.model_type.clone(),
            model_name: scan.model_name.clone(),
            probe_list: scan.probe_list.clone(),
            status: ScanStatus::Running,
            results: None,
            report_name: scan.report_name.clone(),
            created_at,
            finished_at: None,
        }
    }
}

/// 失败结果载荷
pub fn error_payload(message: &str) -> JsonValue {
    serde_json::json!({ "error": message })
}

/// 提交扫描的响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewScanResponse {
    pub message: String,
    pub scan_id: Uuid,
}

/// 单个扫描的状态
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScanStatusView {
    pub status: ScanStatus,
    pub model_type: String,
    pub model_name: String,
}

impl From<&ScanRecord> for ScanStatusView {
    fn from(record: &ScanRecord) -> Self {
        Self {
            status: record.status,
            model_type: record.model_type.clone(),
            model_name: record.model_name.clone(),
        }
    }
}

/// 扫描概要（含时间戳）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScanSummary {
    pub scan_id: Uuid,
    pub status: ScanStatus,
    pub model_type: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub report_name: String,
}

impl From<ScanRecord> for ScanSummary {
    fn from(record: ScanRecord) -> Self {
        Self {
            scan_id: record.scan_id,
            status: record.status,
            model_type: record.model_type,
            model_name: record.model_name,
            created_at: record.created_at,
            report_name: record.report_name,
        }
    }
}
