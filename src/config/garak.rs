use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// garak 扫描工具配置，缺省字段取默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GarakConfig {
    /// 可执行文件（PATH中的名称或绝对路径）
    pub executable: String,
    /// 放在生成参数之前的固定参数，例如 `python -m garak` 的 `["-m", "garak"]`
    pub base_args: Vec<String>,
    /// garak 写入报告文件的目录
    pub report_directory: String,
    /// 每次扫描附加的透传参数
    pub extra_args: Vec<String>,
    /// 单次调用最长等待时间（秒），0 表示不限
    pub timeout_secs: u64,
    /// 同时运行的扫描进程上限
    pub max_concurrent_scans: usize,
    /// 启动时将遗留的 running 扫描标记为失败
    pub recover_interrupted_scans: bool,
}

impl Default for GarakConfig {
    fn default() -> Self {
        Self {
            executable: "garak".to_string(),
            base_args: Vec::new(),
            report_directory: "./garak_runs".to_string(),
            extra_args: Vec::new(),
            timeout_secs: 3600,
            max_concurrent_scans: 4,
            recover_interrupted_scans: true,
        }
    }
}

impl GarakConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.executable.trim().is_empty() {
            return Err("garak executable 不能为空".to_string());
        }

        if self.report_directory.trim().is_empty() {
            return Err("report_directory 不能为空".to_string());
        }

        if self.max_concurrent_scans == 0 {
            return Err("最大并发扫描数必须大于0".to_string());
        }

        Ok(())
    }

    /// 单次调用的等待上限
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// 报告文件路径：`<report_directory>/<report_name><suffix>`
    pub fn report_path(&self, report_name: &str, suffix: &str) -> PathBuf {
        Path::new(&self.report_directory).join(format!("{}{}", report_name, suffix))
    }
}
