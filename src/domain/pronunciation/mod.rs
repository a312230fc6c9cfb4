//! Pronunciation Context - 发音解析限界上下文
//!
//! 职责:
//! - 分层词典包（按固定优先级）
//! - 短语/单词解析，音素化回退
//! - 自动学习词典

mod dict_pack;
mod errors;
mod learner;
mod resolver;

pub use dict_pack::{
    bump_version, is_newer_version, is_valid_pack_name, normalize_entries, DictPack,
    PhraseEntry, AUTO_LEARN_PACK, DEFAULT_PACK_VERSION, LOCAL_OVERRIDES_PACK, PACK_PRIORITY,
};
pub use errors::DictError;
pub use learner::{AutoLearnEntry, AutoLearnFile, DictLearner};
pub use resolver::{
    PackSummary, PronunciationResolver, ResolveResult, ResolvedPhonemes, ResolverSettings,
    PHONEMIZER_SOURCE,
};

use serde_json::Value;

/// 音素化器
///
/// 文本 → 音素串，不可用时返回 None
pub trait Phonemizer: Send + Sync {
    fn phonemize(&self, text: &str) -> Option<String>;
}

/// 词典包存储
///
/// 负责词典文件的读取与自动学习词典的持久化
pub trait DictPackStore: Send + Sync {
    /// 读取词典目录下的全部词典包 JSON
    fn load_pack_files(&self) -> Result<Vec<Value>, DictError>;

    /// 读取自动学习词典 JSON（不存在时返回 None）
    fn load_autolearn(&self) -> Result<Option<Value>, DictError>;

    /// 原子写入自动学习词典
    fn save_autolearn(&self, payload: &Value) -> Result<(), DictError>;

    /// 写入一个词典包的新版本，旧版本文件保留
    fn save_pack(&self, payload: &Value) -> Result<(), DictError>;

    /// 指定名称的最高版本词典包
    fn load_pack(&self, name: &str) -> Result<Option<Value>, DictError> {
        let mut latest: Option<Value> = None;
        for payload in self.load_pack_files()? {
            if payload.get("name").and_then(Value::as_str) != Some(name) {
                continue;
            }
            let version = |p: &Value| {
                p.get("version")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PACK_VERSION)
                    .to_string()
            };
            let newer = match &latest {
                Some(current) => is_newer_version(&version(current), &version(&payload)),
                None => true,
            };
            if newer {
                latest = Some(payload);
            }
        }
        Ok(latest)
    }
}
