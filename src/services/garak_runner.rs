use std::process::Stdio;
use std::time::Instant;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{config::garak::GarakConfig, models::ProbeCatalog, services::probe_parser};

/// garak 调用失败
#[derive(Error, Debug)]
pub enum GarakError {
    #[error("无法启动garak进程 {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("等待garak进程失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("garak执行失败 (退出码 {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("garak执行超时（{0} 秒）")]
    Timeout(u64),

    #[error("扫描已取消")]
    Cancelled,
}

impl GarakError {
    /// 写入失败记录的错误消息；非零退出时为原样的标准错误输出
    pub fn failure_message(&self) -> String {
        match self {
            Self::Failed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// 构造扫描参数
pub fn probe_args(
    probe_list: &[String],
    model_type: &str,
    model_name: &str,
    report_name: &str,
    additional_args: &[String],
) -> Vec<String> {
    let mut args = vec![
        "--model_type".to_string(),
        model_type.to_string(),
        "--model_name".to_string(),
        model_name.to_string(),
        "--probes".to_string(),
        probe_list.join(","),
        "--report_prefix".to_string(),
        report_name.to_string(),
    ];
    args.extend(additional_args.iter().cloned());
    args
}

/// garak 命令行封装
///
/// 每次调用启动一个子进程并等待其退出；子进程设置了 `kill_on_drop`，
/// 超时或取消时随 future 一起被终止。
#[derive(Debug, Clone)]
pub struct GarakRunner {
    config: GarakConfig,
}

impl GarakRunner {
    pub fn new(config: GarakConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GarakConfig {
        &self.config
    }

    /// 列出可用探针
    pub async fn list_probes(&self) -> Result<ProbeCatalog, GarakError> {
        let output = self
            .run_command(vec!["--list_probes".to_string()], &CancellationToken::new())
            .await?;
        Ok(probe_parser::parse_probe_listing(&output))
    }

    /// 执行一次扫描，成功时原样返回标准输出
    pub async fn run_probe(
        &self,
        probe_list: &[String],
        model_type: &str,
        model_name: &str,
        report_name: &str,
        additional_args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, GarakError> {
        let args = probe_args(
            probe_list,
            model_type,
            model_name,
            report_name,
            additional_args,
        );
        self.run_command(args, cancel).await
    }

    async fn run_command(
        &self,
        args: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<String, GarakError> {
        let mut command = Command::new(&self.config.executable);
        command
            .args(&self.config.base_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(executable = %self.config.executable, ?args, "执行garak命令");
        let started = Instant::now();

        let child = command.spawn().map_err(|source| GarakError::Spawn {
            executable: self.config.executable.clone(),
            source,
        })?;
        let wait = child.wait_with_output();

        let output = match self.config.timeout() {
            Some(limit) => tokio::select! {
                _ = cancel.cancelled() => return Err(GarakError::Cancelled),
                res = tokio::time::timeout(limit, wait) => match res {
                    Ok(output) => output?,
                    Err(_) => {
                        warn!(timeout_secs = self.config.timeout_secs, "garak执行超时，子进程已终止");
                        return Err(GarakError::Timeout(self.config.timeout_secs));
                    }
                },
            },
            None => tokio::select! {
                _ = cancel.cancelled() => return Err(GarakError::Cancelled),
                output = wait => output?,
            },
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            info!(elapsed_ms, stdout_len = stdout.len(), "garak执行完成");
            Ok(stdout)
        } else {
            let code = output.status.code();
            warn!(?code, elapsed_ms, "garak返回非零退出码");
            Err(GarakError::Failed {
                code,
                stderr: stderr.trim_end().to_string(),
            })
        }
    }
}
