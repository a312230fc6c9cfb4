//! Dictionary Command Handlers

use std::sync::Arc;

use crate::application::commands::{
    LearnMode, LearnPronunciation, OverridePronunciation, PromotePronunciation, RefreshDicts,
    TeachPronunciation,
};
use crate::application::error::ApplicationError;
use crate::domain::pronunciation::{
    PackSummary, PronunciationResolver, ResolvedPhonemes, LOCAL_OVERRIDES_PACK,
};

/// 写入结果
#[derive(Debug, Clone)]
pub struct LearnedPronunciation {
    pub key: String,
    pub phonemes: String,
    pub source_pack: String,
}

impl LearnedPronunciation {
    fn new(key: String, resolved: ResolvedPhonemes) -> Self {
        Self {
            key,
            phonemes: resolved.phonemes,
            source_pack: resolved.source,
        }
    }
}

// ============================================================================
// LearnPronunciation
// ============================================================================

/// LearnPronunciation Handler
pub struct LearnPronunciationHandler {
    resolver: Arc<PronunciationResolver>,
}

impl LearnPronunciationHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(
        &self,
        command: LearnPronunciation,
    ) -> Result<LearnedPronunciation, ApplicationError> {
        let key = command.key.trim().to_string();
        if key.is_empty() {
            return Err(ApplicationError::validation("key is required"));
        }

        let resolved = match command.mode {
            LearnMode::Phonemize => {
                if !self.resolver.has_phonemizer() {
                    return Err(ApplicationError::validation("phonemizer not available"));
                }
                let text = command
                    .text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&key);
                let phonemes = self
                    .resolver
                    .phonemize(text)
                    .ok_or_else(|| ApplicationError::validation("unable to phonemize text"))?;
                self.resolver.store_phonemes(&key, &phonemes)
            }
            LearnMode::Direct => {
                let phonemes = command.phonemes.as_deref().map(str::trim).unwrap_or("");
                if phonemes.is_empty() {
                    return Err(ApplicationError::validation("phonemes are required"));
                }
                self.resolver.store_phonemes(&key, phonemes)
            }
            LearnMode::Learn => self.resolver.learn_key(&key, true),
        };

        let resolved =
            resolved.ok_or_else(|| ApplicationError::validation("unable to phonemize key"))?;
        tracing::info!(key = %key, source = %resolved.source, mode = ?command.mode, "Pronunciation learned");
        Ok(LearnedPronunciation::new(key, resolved))
    }
}

// ============================================================================
// TeachPronunciation
// ============================================================================

/// TeachPronunciation Handler
pub struct TeachPronunciationHandler {
    resolver: Arc<PronunciationResolver>,
}

impl TeachPronunciationHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(
        &self,
        command: TeachPronunciation,
    ) -> Result<LearnedPronunciation, ApplicationError> {
        let key = command.key.trim().to_string();
        let resolved = self
            .resolver
            .store_phonemes(&key, &command.phonemes)
            .ok_or_else(|| ApplicationError::validation("key and phonemes are required"))?;
        tracing::info!(key = %key, "Pronunciation taught");
        Ok(LearnedPronunciation::new(key, resolved))
    }
}

// ============================================================================
// RefreshDicts
// ============================================================================

/// RefreshDicts Handler
///
/// 外部修改词典文件后重新加载
pub struct RefreshDictsHandler {
    resolver: Arc<PronunciationResolver>,
}

impl RefreshDictsHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(&self, _command: RefreshDicts) -> Result<Vec<PackSummary>, ApplicationError> {
        let resolver = self.resolver.clone();
        tokio::task::spawn_blocking(move || resolver.refresh()).await??;
        let packs = self.resolver.pack_summaries();
        tracing::info!(packs = packs.len(), "Dictionaries refreshed");
        Ok(packs)
    }
}

// ============================================================================
// OverridePronunciation / PromotePronunciation
// ============================================================================

/// 词典包写入结果
#[derive(Debug, Clone)]
pub struct PackEntryWritten {
    pub key: String,
    pub phonemes: String,
    /// 发音来源：override 为目标包，promote 为提升前所在的包
    pub source_pack: String,
    pub target_pack: String,
    pub version: String,
}

/// 在阻塞线程上写词典包（文件读写 + 重新加载）
async fn write_pack_entry(
    resolver: &Arc<PronunciationResolver>,
    pack: &str,
    key: &str,
    phonemes: &str,
    overwrite: bool,
) -> Result<String, ApplicationError> {
    let resolver = resolver.clone();
    let (pack, key, phonemes) = (pack.to_string(), key.to_string(), phonemes.to_string());
    let version = tokio::task::spawn_blocking(move || {
        resolver.write_pack_entry(&pack, &key, &phonemes, overwrite)
    })
    .await??;
    Ok(version)
}

/// OverridePronunciation Handler
pub struct OverridePronunciationHandler {
    resolver: Arc<PronunciationResolver>,
}

impl OverridePronunciationHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(
        &self,
        command: OverridePronunciation,
    ) -> Result<PackEntryWritten, ApplicationError> {
        if command.pack != LOCAL_OVERRIDES_PACK {
            return Err(ApplicationError::validation(
                "only local_overrides can be modified",
            ));
        }
        let key = command.key.trim().to_string();
        let phonemes = command.phonemes.trim().to_string();
        if key.is_empty() || phonemes.is_empty() {
            return Err(ApplicationError::validation("key and phonemes are required"));
        }

        let version = write_pack_entry(&self.resolver, &command.pack, &key, &phonemes, true).await?;
        tracing::info!(key = %key, version = %version, "Pronunciation overridden");
        Ok(PackEntryWritten {
            key,
            phonemes,
            source_pack: command.pack.clone(),
            target_pack: command.pack,
            version,
        })
    }
}

/// PromotePronunciation Handler
///
/// auto_learn 中的词条保留，目标包优先级更高，之后查词典命中目标包
pub struct PromotePronunciationHandler {
    resolver: Arc<PronunciationResolver>,
}

impl PromotePronunciationHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(
        &self,
        command: PromotePronunciation,
    ) -> Result<PackEntryWritten, ApplicationError> {
        let key = command.key.trim().to_string();
        if key.is_empty() {
            return Err(ApplicationError::validation("key is required"));
        }
        let hit = self
            .resolver
            .lookup_key(&key)
            .ok_or_else(|| ApplicationError::not_found("Pronunciation", key.clone()))?;

        let version = write_pack_entry(
            &self.resolver,
            &command.target_pack,
            &key,
            &hit.phonemes,
            command.overwrite,
        )
        .await?;
        tracing::info!(
            key = %key,
            from = %hit.source,
            to = %command.target_pack,
            version = %version,
            "Pronunciation promoted"
        );
        Ok(PackEntryWritten {
            key,
            phonemes: hit.phonemes,
            source_pack: hit.source,
            target_pack: command.target_pack,
            version,
        })
    }
}
