//! garak `--list_probes` 输出解析
//!
//! 输出是面向终端的彩色文本，第一行为横幅，其余每行形如
//! `probes: dan.DAN 🌟`。逐行分类为横幅 / 探针 / 空行 / 无法识别，
//! 无法识别的行会被计数并告警，方便发现 garak 输出格式变化。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ProbeCatalog, ProbeEntry};

/// 缺省状态标记
pub const DEFAULT_PROBE_STATUS: &str = "active";

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[mz]").expect("ANSI正则无效"));

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"garak LLM vulnerability scanner (v[\d.]+)").expect("版本正则无效")
});

static TIMESTAMP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"at (\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+)").expect("时间戳正则无效")
});

static PROBE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^probes: ([\w.]+)( \S+)?").expect("探针行正则无效"));

/// 单行分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeLine<'a> {
    /// 第一行横幅（版本信息已从全文提取）
    Banner,
    /// 探针行
    Probe {
        full_path: &'a str,
        status: Option<&'a str>,
    },
    /// 空白行
    Blank,
    /// 无法识别的行
    Unrecognized,
}

/// 去除 ANSI 转义序列（`ESC [ ... m` 以及 garak 使用的 `ESC [ ... z`）
///
/// 重复替换直到不再匹配，嵌套序列删除后拼出的新序列也会被清除。
pub fn strip_ansi_codes(text: &str) -> String {
    let mut stripped = text.to_string();
    while ANSI_ESCAPE.is_match(&stripped) {
        stripped = ANSI_ESCAPE.replace_all(&stripped, "").into_owned();
    }
    stripped
}

/// 对非首行做分类
pub fn classify_line(line: &str) -> ProbeLine<'_> {
    if line.trim().is_empty() {
        return ProbeLine::Blank;
    }

    match PROBE_LINE.captures(line) {
        Some(caps) => match caps.get(1) {
            Some(path) => ProbeLine::Probe {
                full_path: path.as_str(),
                status: caps.get(2).map(|m| m.as_str().trim()),
            },
            None => ProbeLine::Unrecognized,
        },
        None => ProbeLine::Unrecognized,
    }
}

/// 将点分路径拆为（类别, 具体探针）
pub fn split_probe_path(full_path: &str) -> (&str, Option<&str>) {
    match full_path.split_once('.') {
        Some((category, rest)) => (category, Some(rest)),
        None => (full_path, None),
    }
}

/// 解析 `--list_probes` 的完整输出
pub fn parse_probe_listing(raw: &str) -> ProbeCatalog {
    let content = strip_ansi_codes(raw);

    let version = VERSION_PATTERN
        .captures(&content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let timestamp = TIMESTAMP_PATTERN
        .captures(&content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let mut catalog = ProbeCatalog {
        version,
        timestamp,
        ..ProbeCatalog::default()
    };

    let lines = content
        .split('\n')
        .enumerate()
        .map(|(idx, line)| if idx == 0 { ProbeLine::Banner } else { classify_line(line) });

    for line in lines {
        match line {
            ProbeLine::Probe { full_path, status } => {
                let (category, specific) = split_probe_path(full_path);
                catalog.probes.push(
                    category,
                    ProbeEntry {
                        name: specific.unwrap_or(category).to_string(),
                        full_path: full_path.to_string(),
                        status: status.unwrap_or(DEFAULT_PROBE_STATUS).to_string(),
                    },
                );
            }
            ProbeLine::Unrecognized => catalog.skipped_lines += 1,
            ProbeLine::Banner | ProbeLine::Blank => {}
        }
    }

    if catalog.skipped_lines > 0 {
        tracing::warn!(
            skipped = catalog.skipped_lines,
            "探针列表中存在无法识别的行，garak 输出格式可能已变化"
        );
    }
    tracing::debug!(
        categories = catalog.probes.len(),
        probes = catalog.probe_count(),
        "探针列表解析完成"
    );

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\x1b[1mgarak LLM vulnerability scanner v0.9.0.16 ( https://github.com/NVIDIA/garak ) at 2024-11-05T10:15:30.123456\x1b[0m\n\
\x1b[1;32mprobes: atkgen \x1b[0m🌟\n\
probes: atkgen.Tox\n\
probes: dan 🌟\n\
probes: dan.AntiDAN\n\
probes: dan.DAN 💤\n\
\n\
probes: encoding.InjectBase64\n\
some stray warning line\n";

    #[test]
    fn test_strip_ansi_codes() {
        let input = "\x1b[1;32mprobes\x1b[0m: \x1b[2zdan";
        assert_eq!(strip_ansi_codes(input), "probes: dan");
    }

    #[test]
    fn test_strip_is_idempotent() {
        for input in [SAMPLE, "plain", "", "\x1b[0m\x1b[0m", "\x1b[\x1b[mm"] {
            let once = strip_ansi_codes(input);
            let twice = strip_ansi_codes(&once);
            assert_eq!(once, twice);
            assert!(!ANSI_ESCAPE.is_match(&once));
        }
        assert!(!strip_ansi_codes(SAMPLE).contains("\x1b["));
    }

    #[test]
    fn test_parse_sample_listing() {
        let catalog = parse_probe_listing(SAMPLE);

        assert_eq!(catalog.version.as_deref(), Some("v0.9.0.16"));
        assert_eq!(catalog.timestamp.as_deref(), Some("2024-11-05T10:15:30.123456"));

        let names: Vec<&str> = catalog.probes.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["atkgen", "dan", "encoding"]);

        let dan = catalog.probes.get("dan").unwrap();
        assert_eq!(dan.len(), 3);
        assert_eq!(
            dan[0],
            ProbeEntry {
                name: "dan".to_string(),
                full_path: "dan".to_string(),
                status: "🌟".to_string(),
            }
        );
        assert_eq!(dan[1].status, DEFAULT_PROBE_STATUS);
        assert_eq!(dan[2].name, "DAN");
        assert_eq!(dan[2].status, "💤");

        assert_eq!(catalog.skipped_lines, 1);
    }

    #[test]
    fn test_status_after_stripped_color_codes() {
        let catalog = parse_probe_listing(SAMPLE);
        let atkgen = catalog.probes.get("atkgen").unwrap();
        // 颜色码去除后类别行变为 "probes: atkgen 🌟"
        assert_eq!(atkgen[0].full_path, "atkgen");
        assert_eq!(atkgen[0].status, "🌟");
        assert_eq!(atkgen[1].name, "Tox");
    }

    #[test]
    fn test_multi_segment_names_are_rejoined() {
        let catalog = parse_probe_listing("banner\nprobes: a.b.c\n");
        let entries = catalog.probes.get("a").unwrap();
        assert_eq!(entries[0].name, "b.c");
        assert_eq!(entries[0].full_path, "a.b.c");
    }

    #[test]
    fn test_missing_banner_fields_are_null() {
        let catalog = parse_probe_listing("no banner here\nprobes: dan.DAN\n");
        assert!(catalog.version.is_none());
        assert!(catalog.timestamp.is_none());
        assert_eq!(catalog.probe_count(), 1);

        let json = catalog.to_json().unwrap();
        assert!(json.starts_with(r#"{"version":null,"timestamp":null,"probes":{"dan":"#));
    }

    #[test]
    fn test_first_line_is_never_a_probe() {
        let catalog = parse_probe_listing("probes: dan.DAN\nprobes: lmrc.Bullying\n");
        assert!(catalog.probes.get("dan").is_none());
        assert!(catalog.probes.get("lmrc").is_some());
    }

    #[test]
    fn test_empty_input() {
        let catalog = parse_probe_listing("");
        assert!(catalog.probes.is_empty());
        assert_eq!(
            catalog.to_json().unwrap(),
            r#"{"version":null,"timestamp":null,"probes":{}}"#
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = parse_probe_listing(SAMPLE).to_json().unwrap();
        let second = parse_probe_listing(SAMPLE).to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_path_starts_with_category() {
        let catalog = parse_probe_listing(SAMPLE);
        for (category, entries) in catalog.probes.iter() {
            for entry in entries {
                if entry.name == category && entry.full_path == category {
                    continue;
                }
                assert!(entry.full_path.starts_with(&format!("{}.", category)));
            }
        }
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("   "), ProbeLine::Blank);
        assert_eq!(classify_line("detectors: always.Pass"), ProbeLine::Unrecognized);
        assert_eq!(
            classify_line("probes: dan.DAN 💤"),
            ProbeLine::Probe {
                full_path: "dan.DAN",
                status: Some("💤"),
            }
        );
    }
}
