//! 发音解析器
//!
//! 按固定优先级查找分层词典：短语优先（最长匹配），再逐词查找，
//! 未命中时回退到音素化器，并可选地自动学习结果。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use super::{
    bump_version, is_newer_version, is_valid_pack_name, DictError, DictLearner, DictPack,
    DictPackStore, Phonemizer, PhraseEntry, AUTO_LEARN_PACK, DEFAULT_PACK_VERSION,
    PACK_PRIORITY,
};

/// 音素化器作为来源时的名称
pub const PHONEMIZER_SOURCE: &str = "espeak";

/// 解析器配置
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub enable_autolearn: bool,
    pub autolearn_on_miss: bool,
    pub autolearn_min_len: usize,
    pub autolearn_flush_secs: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            enable_autolearn: true,
            autolearn_on_miss: false,
            autolearn_min_len: 3,
            autolearn_flush_secs: 5,
        }
    }
}

/// 单个词/短语的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPhonemes {
    pub phonemes: String,
    /// 来源词典包名称，音素化器为 "espeak"
    pub source: String,
}

/// 文本解析结果
#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub text: String,
    /// 至少一个 token 解析出音素时才有值
    pub phoneme_text: Option<String>,
    pub dict_versions: BTreeMap<String, String>,
    pub source_counts: BTreeMap<String, u64>,
}

/// 词典包概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    pub name: String,
    pub version: String,
    pub entries: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Separator,
    Phoneme,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
}

#[inline]
fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '\''
}

/// 切分为单词段与分隔段
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    for ch in text.chars() {
        let kind = if is_word_char(ch) {
            TokenKind::Word
        } else {
            TokenKind::Separator
        };
        match tokens.last_mut() {
            Some(last) if last.kind == kind => last.text.push(ch),
            _ => tokens.push(Token {
                kind,
                text: ch.to_string(),
            }),
        }
    }
    tokens
}

/// 从 start 开始匹配短语，返回最后一个词的下标
fn match_phrase_at(tokens: &[Token], start: usize, words: &[String]) -> Option<usize> {
    let mut idx = start;
    for (word_idx, word) in words.iter().enumerate() {
        let token = tokens.get(idx)?;
        if token.kind != TokenKind::Word || token.text.to_lowercase() != *word {
            return None;
        }
        if word_idx == words.len() - 1 {
            return Some(idx);
        }
        idx += 1;
        let sep = tokens.get(idx)?;
        if sep.kind != TokenKind::Separator || !sep.text.chars().all(char::is_whitespace) {
            return None;
        }
        idx += 1;
    }
    None
}

/// 发音解析器
pub struct PronunciationResolver {
    settings: ResolverSettings,
    store: Arc<dyn DictPackStore>,
    phonemizer: Option<Arc<dyn Phonemizer>>,
    packs: RwLock<HashMap<String, DictPack>>,
    learner: RwLock<Option<Arc<DictLearner>>>,
    /// 串行化词典包写入（读取-修改-写入）
    pack_writes: Mutex<()>,
}

impl PronunciationResolver {
    /// 创建解析器并加载词典包
    pub fn new(
        settings: ResolverSettings,
        store: Arc<dyn DictPackStore>,
        phonemizer: Option<Arc<dyn Phonemizer>>,
    ) -> Result<Self, DictError> {
        let learner = if settings.enable_autolearn {
            Some(Arc::new(DictLearner::open(
                store.clone(),
                settings.autolearn_flush_secs,
            )))
        } else {
            None
        };

        let resolver = Self {
            settings,
            store,
            phonemizer,
            packs: RwLock::new(HashMap::new()),
            learner: RwLock::new(learner),
            pack_writes: Mutex::new(()),
        };
        resolver.refresh()?;
        Ok(resolver)
    }

    /// 重新加载全部词典包
    pub fn refresh(&self) -> Result<(), DictError> {
        let mut packs: HashMap<String, DictPack> = HashMap::new();
        for payload in self.store.load_pack_files()? {
            let Some(pack) = DictPack::from_json(&payload) else {
                continue;
            };
            if let Some(existing) = packs.get(&pack.name) {
                if !is_newer_version(&existing.version, &pack.version) {
                    continue;
                }
            }
            packs.insert(pack.name.clone(), pack);
        }

        if let Some(pack) = self.load_autolearn_pack()? {
            packs.insert(pack.name.clone(), pack);
        }

        tracing::info!(packs = packs.len(), "Dictionary packs loaded");
        *self.packs.write() = packs;
        Ok(())
    }

    fn load_autolearn_pack(&self) -> Result<Option<DictPack>, DictError> {
        if let Some(learner) = self.learner.read().as_ref() {
            return Ok(learner.pack());
        }
        let Some(payload) = self.store.load_autolearn()? else {
            return Ok(None);
        };
        let mut pack = DictPack::new(AUTO_LEARN_PACK, DEFAULT_PACK_VERSION);
        if let Some(name) = payload.get("name").and_then(|v| v.as_str()) {
            if !name.is_empty() {
                pack.name = name.to_string();
            }
        }
        if let Some(version) = payload.get("version").and_then(|v| v.as_str()) {
            pack.version = version.to_string();
        }
        if let Some(entries) = payload.get("entries") {
            pack.entries = super::normalize_entries(entries);
        }
        Ok(Some(pack))
    }

    /// 当前词典版本向量
    pub fn dict_versions(&self) -> BTreeMap<String, String> {
        self.packs
            .read()
            .values()
            .map(|p| (p.name.clone(), p.version.clone()))
            .collect()
    }

    /// 词典包概要（按优先级排序，其余按名称）
    pub fn pack_summaries(&self) -> Vec<PackSummary> {
        let packs = self.packs.read();
        let mut summaries: Vec<PackSummary> = packs
            .values()
            .map(|p| PackSummary {
                name: p.name.clone(),
                version: p.version.clone(),
                entries: p.entries.len(),
            })
            .collect();
        summaries.sort_by_key(|s| {
            let rank = PACK_PRIORITY
                .iter()
                .position(|n| *n == s.name)
                .unwrap_or(PACK_PRIORITY.len());
            (rank, s.name.clone())
        });
        summaries
    }

    pub fn has_phonemizer(&self) -> bool {
        self.phonemizer.is_some()
    }

    /// 直接调用音素化器
    pub fn phonemize(&self, text: &str) -> Option<String> {
        self.phonemizer.as_ref()?.phonemize(text)
    }

    fn lookup_dicts(&self, key: &str) -> Option<ResolvedPhonemes> {
        let packs = self.packs.read();
        PACK_PRIORITY.iter().find_map(|name| {
            packs.get(*name).and_then(|pack| {
                pack.get(key).map(|phonemes| ResolvedPhonemes {
                    phonemes: phonemes.to_string(),
                    source: name.to_string(),
                })
            })
        })
    }

    /// 只查词典（不调用音素化器）
    pub fn lookup_key(&self, key: &str) -> Option<ResolvedPhonemes> {
        let normalized = key.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.lookup_dicts(&normalized)
    }

    /// 音素化并学习
    ///
    /// force_store 为 true 时无论是否开启自动学习都写入 auto_learn
    pub fn learn_key(&self, key: &str, force_store: bool) -> Option<ResolvedPhonemes> {
        let normalized = key.trim();
        if normalized.is_empty() {
            return None;
        }
        let phonemes = self.phonemize(normalized)?;
        if force_store || (self.settings.enable_autolearn && self.learner.read().is_some()) {
            self.learn_autolearn(normalized, &phonemes);
        }
        Some(ResolvedPhonemes {
            phonemes,
            source: PHONEMIZER_SOURCE.to_string(),
        })
    }

    /// 直接写入自动学习词典（teach）
    pub fn store_phonemes(&self, key: &str, phonemes: &str) -> Option<ResolvedPhonemes> {
        let key = key.trim();
        let phonemes = phonemes.trim();
        if key.is_empty() || phonemes.is_empty() {
            return None;
        }
        self.learn_autolearn(key, phonemes);
        Some(ResolvedPhonemes {
            phonemes: phonemes.to_string(),
            source: AUTO_LEARN_PACK.to_string(),
        })
    }

    /// 向词典包写入一个词条，生成新版本文件并重新加载
    ///
    /// 词典包不存在时从 1.0.0 初始化；overwrite 为 false 且词条已存在时返回
    /// `EntryExists`。返回新版本号
    pub fn write_pack_entry(
        &self,
        pack: &str,
        key: &str,
        phonemes: &str,
        overwrite: bool,
    ) -> Result<String, DictError> {
        let key = key.trim().to_lowercase();
        let phonemes = phonemes.trim();
        if key.is_empty() || phonemes.is_empty() {
            return Err(DictError::InvalidEntry("key and phonemes are required".to_string()));
        }
        if pack == AUTO_LEARN_PACK || !is_valid_pack_name(pack) {
            return Err(DictError::InvalidEntry(format!("pack '{}' is not writable", pack)));
        }

        let _guard = self.pack_writes.lock();
        let mut payload = self
            .store
            .load_pack(pack)?
            .unwrap_or_else(|| json!({ "name": pack, "version": "1.0.0", "entries": {} }));
        let Some(object) = payload.as_object_mut() else {
            return Err(DictError::ParseError(format!("pack '{}' is not an object", pack)));
        };

        let entries = object
            .entry("entries")
            .or_insert_with(|| Value::Object(Default::default()));
        if !entries.is_object() {
            *entries = Value::Object(Default::default());
        }
        if let Some(entries) = entries.as_object_mut() {
            if !overwrite && entries.contains_key(&key) {
                return Err(DictError::EntryExists(key));
            }
            entries.insert(key.clone(), Value::String(phonemes.to_string()));
        }

        let current = object
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PACK_VERSION);
        let version = bump_version(current);
        object.insert("version".to_string(), Value::String(version.clone()));

        self.store.save_pack(&payload)?;
        tracing::info!(pack = %pack, key = %key, version = %version, "Dictionary pack updated");
        self.refresh()?;
        Ok(version)
    }

    /// 刷写自动学习词典
    pub fn flush(&self) -> Result<(), DictError> {
        match self.learner.read().as_ref() {
            Some(learner) => learner.flush(),
            None => Ok(()),
        }
    }

    /// 解析单个单词
    pub fn resolve_word(&self, word: &str) -> Option<ResolvedPhonemes> {
        if let Some(hit) = self.lookup_dicts(&word.to_lowercase()) {
            return Some(hit);
        }
        let phonemes = self.phonemize(word)?;
        if self.should_autolearn(word, &phonemes) {
            self.learn_autolearn(word, &phonemes);
        }
        Some(ResolvedPhonemes {
            phonemes,
            source: PHONEMIZER_SOURCE.to_string(),
        })
    }

    fn should_autolearn(&self, word: &str, phonemes: &str) -> bool {
        if !self.settings.enable_autolearn || !self.settings.autolearn_on_miss {
            return false;
        }
        if self.learner.read().is_none() || phonemes.is_empty() {
            return false;
        }
        if word.chars().count() < self.settings.autolearn_min_len.max(2) {
            return false;
        }
        if !word.chars().all(char::is_alphabetic) {
            return false;
        }
        let lowered = word.to_lowercase();
        let packs = self.packs.read();
        !PACK_PRIORITY
            .iter()
            .filter(|name| **name != AUTO_LEARN_PACK)
            .any(|name| packs.get(*name).map(|p| p.contains(&lowered)).unwrap_or(false))
    }

    fn learner_or_create(&self) -> Arc<DictLearner> {
        if let Some(learner) = self.learner.read().as_ref() {
            return learner.clone();
        }
        let mut guard = self.learner.write();
        guard
            .get_or_insert_with(|| {
                Arc::new(DictLearner::open(
                    self.store.clone(),
                    self.settings.autolearn_flush_secs,
                ))
            })
            .clone()
    }

    fn learn_autolearn(&self, key: &str, phonemes: &str) {
        let learner = self.learner_or_create();
        let normalized = key.to_lowercase();
        if let Err(e) = learner.learn(&normalized, phonemes) {
            tracing::warn!(key = %normalized, error = %e, "Failed to record auto-learn entry");
        }

        let mut packs = self.packs.write();
        let pack = packs
            .entry(AUTO_LEARN_PACK.to_string())
            .or_insert_with(|| DictPack::new(AUTO_LEARN_PACK, learner.version()));
        pack.entries.insert(normalized, phonemes.trim().to_string());
        pack.version = learner.version();
    }

    /// 各词典包的短语条目（按优先级）
    fn phrase_entries(&self) -> Vec<(&'static str, Vec<PhraseEntry>)> {
        let packs = self.packs.read();
        PACK_PRIORITY
            .iter()
            .filter_map(|name| {
                let entries = packs.get(*name)?.phrase_entries();
                if entries.is_empty() {
                    None
                } else {
                    Some((*name, entries))
                }
            })
            .collect()
    }

    fn apply_phrase_overrides(
        &self,
        tokens: Vec<Token>,
        source_counts: &mut BTreeMap<String, u64>,
    ) -> Vec<Token> {
        let phrases = self.phrase_entries();
        if phrases.is_empty() {
            return tokens;
        }

        let mut output = Vec::with_capacity(tokens.len());
        let mut idx = 0;
        while idx < tokens.len() {
            if tokens[idx].kind != TokenKind::Word {
                output.push(tokens[idx].clone());
                idx += 1;
                continue;
            }

            let start_word = tokens[idx].text.to_lowercase();
            let matched = phrases.iter().find_map(|(pack_name, entries)| {
                entries
                    .iter()
                    .filter(|entry| entry.words[0] == start_word)
                    .find_map(|entry| {
                        match_phrase_at(&tokens, idx, &entry.words)
                            .map(|end| (end, entry.phonemes.clone(), *pack_name))
                    })
            });

            match matched {
                Some((end, phonemes, pack_name)) => {
                    output.push(Token {
                        kind: TokenKind::Phoneme,
                        text: phonemes,
                    });
                    *source_counts.entry(pack_name.to_string()).or_insert(0) += 1;
                    idx = end + 1;
                }
                None => {
                    output.push(tokens[idx].clone());
                    idx += 1;
                }
            }
        }
        output
    }

    /// 解析整段文本
    pub fn resolve_text(&self, text: &str) -> ResolveResult {
        let mut source_counts = BTreeMap::new();
        let mut tokens = self.apply_phrase_overrides(tokenize(text), &mut source_counts);

        let mut found = tokens.iter().any(|t| t.kind == TokenKind::Phoneme);
        for token in tokens.iter_mut() {
            if token.kind != TokenKind::Word {
                continue;
            }
            if let Some(resolved) = self.resolve_word(&token.text) {
                token.kind = TokenKind::Phoneme;
                token.text = resolved.phonemes;
                found = true;
                *source_counts.entry(resolved.source).or_insert(0) += 1;
            }
        }

        let phoneme_text = if found {
            Some(tokens.iter().map(|t| t.text.as_str()).collect::<String>())
        } else {
            None
        };

        ResolveResult {
            text: text.to_string(),
            phoneme_text,
            dict_versions: self.dict_versions(),
            source_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pronunciation::learner::tests::MemoryDictStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct UpperPhonemizer {
        calls: AtomicUsize,
    }

    impl Phonemizer for UpperPhonemizer {
        fn phonemize(&self, text: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(format!("/{}/", text.to_uppercase()))
        }
    }

    fn store_with(packs: Vec<serde_json::Value>) -> Arc<MemoryDictStore> {
        let store = MemoryDictStore::default();
        *store.packs.lock() = packs;
        Arc::new(store)
    }

    fn no_autolearn() -> ResolverSettings {
        ResolverSettings {
            enable_autolearn: false,
            ..ResolverSettings::default()
        }
    }

    #[test]
    fn test_tokenize_keeps_all_text() {
        let tokens = tokenize("Gojo's here, ok?");
        let joined: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(joined, "Gojo's here, ok?");
        assert_eq!(tokens[0].text, "Gojo's");
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[1].kind, TokenKind::Separator);
    }

    #[test]
    fn test_phrase_match_prefers_phrase_over_word() {
        let store = store_with(vec![json!({
            "name": "anime_en",
            "version": "1.0.0",
            "entries": { "gojo satoru": "GOJO_SATORU", "gojo": "GOJO" }
        })]);
        let resolver = PronunciationResolver::new(no_autolearn(), store, None).unwrap();

        let result = resolver.resolve_text("Gojo Satoru arrives.");
        let phonemes = result.phoneme_text.unwrap();

        assert!(phonemes.contains("GOJO_SATORU"));
        assert!(!phonemes.contains("GOJO "));
        assert_eq!(result.source_counts.get("anime_en"), Some(&1));
    }

    #[test]
    fn test_phrase_requires_whitespace_separator() {
        let store = store_with(vec![json!({
            "name": "anime_en",
            "version": "1.0.0",
            "entries": { "gojo satoru": "GOJO_SATORU" }
        })]);
        let resolver = PronunciationResolver::new(no_autolearn(), store, None).unwrap();

        let result = resolver.resolve_text("Gojo, Satoru");
        assert!(result.phoneme_text.is_none());
    }

    #[test]
    fn test_priority_order_wins() {
        let store = store_with(vec![
            json!({ "name": "en_core", "version": "1.0.0", "entries": { "kira": "LOW" } }),
            json!({ "name": "local_overrides", "version": "1.0.0", "entries": { "kira": "HIGH" } }),
        ]);
        let resolver = PronunciationResolver::new(no_autolearn(), store, None).unwrap();

        let resolved = resolver.resolve_word("Kira").unwrap();
        assert_eq!(resolved.phonemes, "HIGH");
        assert_eq!(resolved.source, "local_overrides");
    }

    #[test]
    fn test_highest_version_per_name_wins() {
        let store = store_with(vec![
            json!({ "name": "en_core", "version": "1.2.0", "entries": { "a": "NEW" } }),
            json!({ "name": "en_core", "version": "1.1.9", "entries": { "a": "OLD" } }),
        ]);
        let resolver = PronunciationResolver::new(no_autolearn(), store, None).unwrap();

        assert_eq!(resolver.lookup_key("A").unwrap().phonemes, "NEW");
        assert_eq!(resolver.dict_versions().get("en_core").unwrap(), "1.2.0");
    }

    #[test]
    fn test_no_phonemes_without_any_resolution() {
        let resolver =
            PronunciationResolver::new(no_autolearn(), store_with(vec![]), None).unwrap();
        let result = resolver.resolve_text("Nothing matches here.");
        assert!(result.phoneme_text.is_none());
        assert!(result.source_counts.is_empty());
    }

    #[test]
    fn test_phonemizer_fallback_counts_as_espeak() {
        let phonemizer: Arc<dyn Phonemizer> = Arc::new(UpperPhonemizer {
            calls: AtomicUsize::new(0),
        });
        let resolver =
            PronunciationResolver::new(no_autolearn(), store_with(vec![]), Some(phonemizer))
                .unwrap();

        let result = resolver.resolve_text("hi there");
        assert_eq!(result.phoneme_text.as_deref(), Some("/HI/ /THERE/"));
        assert_eq!(result.source_counts.get(PHONEMIZER_SOURCE), Some(&2));
    }

    #[test]
    fn test_autolearn_on_miss_gates() {
        let store = store_with(vec![json!({
            "name": "en_core", "version": "1.0.0", "entries": { "known": "K" }
        })]);
        let phonemizer = Arc::new(UpperPhonemizer {
            calls: AtomicUsize::new(0),
        });
        let settings = ResolverSettings {
            enable_autolearn: true,
            autolearn_on_miss: true,
            autolearn_min_len: 3,
            autolearn_flush_secs: 60,
        };
        let dyn_phonemizer: Arc<dyn Phonemizer> = phonemizer.clone();
        let resolver = PronunciationResolver::new(settings, store, Some(dyn_phonemizer)).unwrap();

        resolver.resolve_text("ab ryuk don't");
        // "ab" 太短，"don't" 含撇号，只学习 "ryuk"
        assert_eq!(resolver.lookup_key("ryuk").unwrap().source, AUTO_LEARN_PACK);
        assert!(resolver.lookup_key("ab").is_none());
        assert!(resolver.lookup_key("don't").is_none());

        // 第二次命中 auto_learn，不再调用音素化器
        let before = phonemizer.calls.load(Ordering::SeqCst);
        resolver.resolve_word("Ryuk");
        assert_eq!(phonemizer.calls.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_store_phonemes_ignores_autolearn_setting() {
        let store = store_with(vec![]);
        let resolver = PronunciationResolver::new(no_autolearn(), store.clone(), None).unwrap();

        let stored = resolver.store_phonemes("Misa", "misə").unwrap();
        assert_eq!(stored.source, AUTO_LEARN_PACK);
        assert_eq!(resolver.lookup_key("misa").unwrap().phonemes, "misə");
        assert!(resolver.dict_versions().contains_key(AUTO_LEARN_PACK));

        resolver.flush().unwrap();
        assert_eq!(*store.saves.lock(), 1);
    }

    #[test]
    fn test_learn_key_requires_phonemizer() {
        let resolver =
            PronunciationResolver::new(no_autolearn(), store_with(vec![]), None).unwrap();
        assert!(resolver.learn_key("light", true).is_none());
    }

    #[test]
    fn test_write_pack_entry_bumps_version_and_takes_priority() {
        let store = store_with(vec![json!({
            "name": "en_core", "version": "1.0.0", "entries": { "gojo": "GOH JOH" }
        })]);
        let resolver = PronunciationResolver::new(no_autolearn(), store.clone(), None).unwrap();

        let version = resolver
            .write_pack_entry("local_overrides", " Gojo ", "PH", true)
            .unwrap();
        assert_eq!(version, "1.0.1");
        let hit = resolver.lookup_key("gojo").unwrap();
        assert_eq!(hit.source, "local_overrides");
        assert_eq!(hit.phonemes, "PH");

        let version = resolver
            .write_pack_entry("local_overrides", "gojo", "PH2", true)
            .unwrap();
        assert_eq!(version, "1.0.2");
        assert_eq!(resolver.lookup_key("gojo").unwrap().phonemes, "PH2");
        assert_eq!(store.packs.lock().len(), 3);
    }

    #[test]
    fn test_write_pack_entry_rejects() {
        let resolver =
            PronunciationResolver::new(no_autolearn(), store_with(vec![]), None).unwrap();
        resolver
            .write_pack_entry("local_overrides", "near", "NIR", false)
            .unwrap();

        assert!(matches!(
            resolver.write_pack_entry("local_overrides", "near", "X", false),
            Err(DictError::EntryExists(_))
        ));
        assert!(matches!(
            resolver.write_pack_entry("auto_learn", "near", "X", true),
            Err(DictError::InvalidEntry(_))
        ));
        assert!(matches!(
            resolver.write_pack_entry("../x", "near", "X", true),
            Err(DictError::InvalidEntry(_))
        ));
        assert!(matches!(
            resolver.write_pack_entry("local_overrides", " ", "X", true),
            Err(DictError::InvalidEntry(_))
        ));
        assert_eq!(resolver.lookup_key("near").unwrap().phonemes, "NIR");
    }

    #[test]
    fn test_refresh_picks_up_new_packs() {
        let store = store_with(vec![]);
        let resolver = PronunciationResolver::new(no_autolearn(), store.clone(), None).unwrap();
        assert!(resolver.lookup_key("near").is_none());

        store.packs.lock().push(json!({
            "name": "local_overrides", "version": "1.0.0", "entries": { "near": "NIR" }
        }));
        resolver.refresh().unwrap();
        assert_eq!(resolver.lookup_key("near").unwrap().phonemes, "NIR");
    }
}
