//! 测试辅助：用 `/bin/sh` 脚本模拟 garak

use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::garak::GarakConfig;

/// 脚本中的占位符，会被替换为报告目录
pub const REPORT_DIR_PLACEHOLDER: &str = "__REPORT_DIR__";

/// 解析 `--report_prefix` 并写出 jsonl/html 报告的脚本片段
pub const WRITE_REPORTS: &str = r#"prefix=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--report_prefix" ]; then prefix="$2"; fi
  shift
done
printf '{"entry_type": "init"}\n' > "__REPORT_DIR__/$prefix.report.jsonl"
printf '<html>report</html>\n' > "__REPORT_DIR__/$prefix.report.html"
"#;

pub struct FakeGarak {
    /// 持有临时目录，drop 时清理
    pub dir: TempDir,
    pub report_dir: PathBuf,
    pub config: GarakConfig,
}

/// 生成模拟 garak 脚本及对应配置
pub fn fake_garak(script_body: &str) -> FakeGarak {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let report_dir = dir.path().join("reports");
    std::fs::create_dir_all(&report_dir).expect("创建报告目录失败");

    let script = dir.path().join("garak.sh");
    let body = script_body.replace(REPORT_DIR_PLACEHOLDER, &report_dir.to_string_lossy());
    std::fs::write(&script, body).expect("写入脚本失败");

    let config = GarakConfig {
        executable: "/bin/sh".to_string(),
        base_args: vec![script.to_string_lossy().into_owned()],
        report_directory: report_dir.to_string_lossy().into_owned(),
        extra_args: Vec::new(),
        timeout_secs: 30,
        max_concurrent_scans: 4,
        recover_interrupted_scans: true,
    };

    FakeGarak {
        dir,
        report_dir,
        config,
    }
}
