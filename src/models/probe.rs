use serde::{Serialize, Serializer};
use utoipa::ToSchema;

/// 探针目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProbeEntry {
    /// 具体探针名；单段路径时为类别名
    pub name: String,
    /// 完整点分路径
    pub full_path: String,
    /// 状态标记，缺省为 `active`
    pub status: String,
}

/// 按类别分组的探针，保持首次出现的顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeCategories(Vec<(String, Vec<ProbeEntry>)>);

impl ProbeCategories {
    /// 追加条目，类别首次出现时创建
    pub fn push(&mut self, category: &str, entry: ProbeEntry) {
        match self.0.iter_mut().find(|(name, _)| name == category) {
            Some((_, entries)) => entries.push(entry),
            None => self.0.push((category.to_string(), vec![entry])),
        }
    }

    pub fn get(&self, category: &str) -> Option<&[ProbeEntry]> {
        self.0
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ProbeEntry])> {
        self.0
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ProbeCategories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, entries)| (name, entries)))
    }
}

/// 解析后的探针目录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProbeCatalog {
    /// garak 版本，如 `v0.9.0.16`
    pub version: Option<String>,
    /// 输出中的时间戳
    pub timestamp: Option<String>,
    /// 类别 → 条目列表
    #[schema(value_type = Object)]
    pub probes: ProbeCategories,
    /// 无法识别而被跳过的行数
    #[serde(skip)]
    pub skipped_lines: usize,
}

impl ProbeCatalog {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 条目总数
    pub fn probe_count(&self) -> usize {
        self.probes.iter().map(|(_, entries)| entries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, full_path: &str) -> ProbeEntry {
        ProbeEntry {
            name: name.to_string(),
            full_path: full_path.to_string(),
            status: "active".to_string(),
        }
    }

    #[test]
    fn test_categories_keep_first_seen_order() {
        let mut categories = ProbeCategories::default();
        categories.push("lmrc", entry("lmrc", "lmrc"));
        categories.push("dan", entry("dan", "dan"));
        categories.push("lmrc", entry("Bullying", "lmrc.Bullying"));

        let names: Vec<&str> = categories.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["lmrc", "dan"]);
        assert_eq!(categories.get("lmrc").map(|e| e.len()), Some(2));
        assert!(categories.get("encoding").is_none());
    }

    #[test]
    fn test_catalog_field_order() {
        let mut catalog = ProbeCatalog {
            version: Some("v0.9.0.16".to_string()),
            timestamp: None,
            ..ProbeCatalog::default()
        };
        catalog.probes.push("zeta", entry("zeta", "zeta"));
        catalog.probes.push("alpha", entry("alpha", "alpha"));

        let json = catalog.to_json().unwrap();
        assert!(json.starts_with(r#"{"version":"v0.9.0.16","timestamp":null,"probes":{"zeta""#));
        assert!(json.find("\"zeta\"").unwrap() < json.find("\"alpha\"").unwrap());
        assert!(!json.contains("skipped_lines"));
    }
}
