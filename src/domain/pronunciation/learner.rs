//! 自动学习词典
//!
//! 未命中词典但由音素化器解析出的单词会被记录下来，定期刷写到磁盘。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DictError, DictPack, DictPackStore, AUTO_LEARN_PACK};

/// 自动学习词条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoLearnEntry {
    pub phonemes: String,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl AutoLearnEntry {
    /// 兼容字符串与对象两种格式
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let phonemes = s.trim();
                if phonemes.is_empty() {
                    return None;
                }
                Some(Self {
                    phonemes: phonemes.to_string(),
                    count: 1,
                    updated_at: None,
                })
            }
            Value::Object(obj) => {
                let phonemes = obj.get("phonemes").and_then(Value::as_str)?.trim();
                if phonemes.is_empty() {
                    return None;
                }
                let count = obj
                    .get("count")
                    .and_then(Value::as_u64)
                    .filter(|c| *c > 0)
                    .unwrap_or(1);
                let updated_at = obj
                    .get("updated_at")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(Self {
                    phonemes: phonemes.to_string(),
                    count,
                    updated_at,
                })
            }
            _ => None,
        }
    }
}

/// 自动学习词典文件格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoLearnFile {
    pub name: String,
    pub version: String,
    pub format: String,
    pub entries: BTreeMap<String, AutoLearnEntry>,
}

struct LearnerState {
    entries: BTreeMap<String, AutoLearnEntry>,
    pending: BTreeSet<String>,
    last_flush: Instant,
    version: String,
}

/// 自动学习器
pub struct DictLearner {
    store: Arc<dyn DictPackStore>,
    flush_interval: Duration,
    state: Mutex<LearnerState>,
}

impl DictLearner {
    /// 版本号：UTC 时间戳
    pub fn current_version() -> String {
        Utc::now().format("%Y%m%d-%H%M%S").to_string()
    }

    /// 打开自动学习器并加载已有词条
    ///
    /// 已有文件损坏时从空词典开始
    pub fn open(store: Arc<dyn DictPackStore>, flush_secs: u64) -> Self {
        let mut state = LearnerState {
            entries: BTreeMap::new(),
            pending: BTreeSet::new(),
            last_flush: Instant::now(),
            version: Self::current_version(),
        };

        match store.load_autolearn() {
            Ok(Some(payload)) => {
                if let Some(version) = payload
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                {
                    state.version = version.to_string();
                }
                if let Some(entries) = payload.get("entries").and_then(Value::as_object) {
                    for (key, value) in entries {
                        if let Some(entry) = AutoLearnEntry::from_value(value) {
                            state.entries.insert(key.to_lowercase(), entry);
                        }
                    }
                }
                tracing::debug!(entries = state.entries.len(), "Auto-learn pack loaded");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load auto-learn pack, starting empty");
            }
        }

        Self {
            store,
            flush_interval: Duration::from_secs(flush_secs.max(1)),
            state: Mutex::new(state),
        }
    }

    pub fn version(&self) -> String {
        self.state.lock().version.clone()
    }

    /// 当前词条组成的词典包，没有词条时返回 None
    pub fn pack(&self) -> Option<DictPack> {
        let state = self.state.lock();
        if state.entries.is_empty() {
            return None;
        }
        let mut pack = DictPack::new(AUTO_LEARN_PACK, state.version.clone());
        for (key, entry) in state.entries.iter() {
            pack.entries.insert(key.clone(), entry.phonemes.clone());
        }
        Some(pack)
    }

    /// 记录一个词条
    ///
    /// 距上次刷写超过间隔时同步刷写
    pub fn learn(&self, key: &str, phonemes: &str) -> Result<(), DictError> {
        let key = key.trim().to_lowercase();
        let phonemes = phonemes.trim();
        if key.is_empty() || phonemes.is_empty() {
            return Err(DictError::InvalidEntry(key));
        }

        let mut state = self.state.lock();
        let count = state.entries.get(&key).map(|e| e.count + 1).unwrap_or(1);
        state.entries.insert(
            key.clone(),
            AutoLearnEntry {
                phonemes: phonemes.to_string(),
                count,
                updated_at: Some(Utc::now().to_rfc3339()),
            },
        );
        state.pending.insert(key);

        if state.last_flush.elapsed() >= self.flush_interval {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// 立即刷写待写入的词条
    pub fn flush(&self) -> Result<(), DictError> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut LearnerState) -> Result<(), DictError> {
        if state.pending.is_empty() {
            return Ok(());
        }
        state.version = Self::current_version();
        let file = AutoLearnFile {
            name: AUTO_LEARN_PACK.to_string(),
            version: state.version.clone(),
            format: "espeak".to_string(),
            entries: state.entries.clone(),
        };
        let payload =
            serde_json::to_value(&file).map_err(|e| DictError::ParseError(e.to_string()))?;
        self.store.save_autolearn(&payload)?;

        tracing::debug!(
            pending = state.pending.len(),
            version = %state.version,
            "Auto-learn pack flushed"
        );
        state.pending.clear();
        state.last_flush = Instant::now();
        Ok(())
    }
}
