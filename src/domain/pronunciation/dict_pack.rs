//! Pronunciation Context - 词典包

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

/// 自动学习词典包名称
pub const AUTO_LEARN_PACK: &str = "auto_learn";

/// 人工覆盖词典包名称
pub const LOCAL_OVERRIDES_PACK: &str = "local_overrides";

/// 词典包优先级（从高到低）
pub const PACK_PRIORITY: [&str; 4] = [LOCAL_OVERRIDES_PACK, AUTO_LEARN_PACK, "anime_en", "en_core"];

/// 缺省版本号
pub const DEFAULT_PACK_VERSION: &str = "0.0.0";

/// 词典包
///
/// key 为小写单词或以空格连接的短语，value 为音素串
#[derive(Debug, Clone, PartialEq)]
pub struct DictPack {
    pub name: String,
    pub version: String,
    pub entries: HashMap<String, String>,
}

impl DictPack {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            entries: HashMap::new(),
        }
    }

    /// 从词典包 JSON 解析
    ///
    /// 缺少 name 的文件返回 None；条目值可以是字符串或 `{ "phonemes": ... }`
    pub fn from_json(payload: &Value) -> Option<Self> {
        let name = payload.get("name").and_then(Value::as_str)?.trim();
        if name.is_empty() {
            return None;
        }
        let version = payload
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PACK_VERSION);
        let entries = payload
            .get("entries")
            .map(normalize_entries)
            .unwrap_or_default();
        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
            entries,
        })
    }

    pub fn with_entries<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.entries.insert(key.into().to_lowercase(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 短语条目（按词数从多到少排序）
    pub fn phrase_entries(&self) -> Vec<PhraseEntry> {
        let mut phrases: Vec<PhraseEntry> = self
            .entries
            .iter()
            .filter(|(key, value)| key.contains(' ') && !value.is_empty())
            .filter_map(|(key, value)| {
                let words: Vec<String> = key.split_whitespace().map(str::to_string).collect();
                if words.is_empty() {
                    None
                } else {
                    Some(PhraseEntry {
                        words,
                        phonemes: value.clone(),
                    })
                }
            })
            .collect();
        phrases.sort_by(|a, b| b.words.len().cmp(&a.words.len()));
        phrases
    }
}

/// 短语条目
#[derive(Debug, Clone)]
pub struct PhraseEntry {
    pub words: Vec<String>,
    pub phonemes: String,
}

/// 规范化词条：key 转小写，丢弃空值
pub fn normalize_entries(entries: &Value) -> HashMap<String, String> {
    let Some(map) = entries.as_object() else {
        return HashMap::new();
    };

    let mut normalized = HashMap::with_capacity(map.len());
    for (key, value) in map {
        if key.is_empty() {
            continue;
        }
        let phonemes = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Object(obj) => match obj.get("phonemes") {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string().trim().to_string(),
            },
            _ => String::new(),
        };
        if !phonemes.is_empty() {
            normalized.insert(key.to_lowercase(), phonemes);
        }
    }
    normalized
}

/// 解析点分数字版本号，非法时返回 None
fn parse_version(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect()
}

fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// 词典包写入后的新版本号
///
/// 三段式版本递增补丁号，其余一律从 1.0.0 重新开始
pub fn bump_version(version: &str) -> String {
    match parse_version(version).as_deref() {
        Some([major, minor, patch]) => format!("{}.{}.{}", major, minor, patch + 1),
        _ => "1.0.0".to_string(),
    }
}

/// 词典包名称只允许字母、数字、`_` 与 `-`，用作文件名前缀
pub fn is_valid_pack_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 候选版本是否比已有版本更新
///
/// 两者都合法时按分量比较；合法版本优于非法版本；两者都非法时保留已有
pub fn is_newer_version(existing: &str, candidate: &str) -> bool {
    match (parse_version(existing), parse_version(candidate)) {
        (Some(e), Some(c)) => compare_versions(&c, &e) == Ordering::Greater,
        (None, Some(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version("1.0.0"), "1.0.1");
        assert_eq!(bump_version("v2.3.9"), "2.3.10");
        assert_eq!(bump_version("1.0"), "1.0.0");
        assert_eq!(bump_version("20240101-120000"), "1.0.0");
        assert!(is_valid_pack_name("local_overrides"));
        assert!(!is_valid_pack_name("../etc"));
        assert!(!is_valid_pack_name(""));
    }

    #[test]
    fn test_version_ordering() {
        assert!(is_newer_version("1.2.0", "1.10.0"));
        assert!(!is_newer_version("1.10.0", "1.2.0"));
        assert!(!is_newer_version("1.0", "1.0.0"));
        assert!(is_newer_version("garbage", "0.0.1"));
        assert!(!is_newer_version("0.0.1", "garbage"));
        assert!(!is_newer_version("bad", "worse"));
    }

    #[test]
    fn test_from_json_normalizes_entries() {
        let payload = json!({
            "name": "anime_en",
            "version": "1.0.0",
            "entries": {
                "Gojo": "ɡoʊdʒoʊ",
                "satoru": { "phonemes": " sɑtɔɹu " },
                "empty": "",
                "skip": { "count": 3 }
            }
        });
        let pack = DictPack::from_json(&payload).unwrap();

        assert_eq!(pack.name, "anime_en");
        assert_eq!(pack.get("gojo"), Some("ɡoʊdʒoʊ"));
        assert_eq!(pack.get("satoru"), Some("sɑtɔɹu"));
        assert!(!pack.contains("empty"));
        assert!(!pack.contains("skip"));
    }

    #[test]
    fn test_from_json_requires_name() {
        assert!(DictPack::from_json(&json!({ "entries": {} })).is_none());
        let pack = DictPack::from_json(&json!({ "name": "x" })).unwrap();
        assert_eq!(pack.version, DEFAULT_PACK_VERSION);
    }

    #[test]
    fn test_phrase_entries_longest_first() {
        let pack = DictPack::new("p", "1.0.0").with_entries([
            ("gojo satoru", "A"),
            ("gojo satoru sensei", "B"),
            ("gojo", "C"),
        ]);
        let phrases = pack.phrase_entries();

        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].words.len(), 3);
        assert_eq!(phrases[1].phonemes, "A");
    }
}
