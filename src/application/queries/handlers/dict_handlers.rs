//! Dictionary Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::queries::{
    ListDicts, LookupPronunciation, PhonemizeText, PhonemizedText, PronunciationView,
};
use crate::domain::pronunciation::{PackSummary, PronunciationResolver, PHONEMIZER_SOURCE};

/// ListDicts Handler
pub struct ListDictsHandler {
    resolver: Arc<PronunciationResolver>,
}

impl ListDictsHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(&self, _query: ListDicts) -> Result<Vec<PackSummary>, ApplicationError> {
        Ok(self.resolver.pack_summaries())
    }
}

/// LookupPronunciation Handler
pub struct LookupPronunciationHandler {
    resolver: Arc<PronunciationResolver>,
}

impl LookupPronunciationHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(
        &self,
        query: LookupPronunciation,
    ) -> Result<PronunciationView, ApplicationError> {
        let hit = self
            .resolver
            .lookup_key(&query.key)
            .ok_or_else(|| ApplicationError::not_found("Pronunciation", query.key.clone()))?;
        Ok(PronunciationView {
            key: query.key,
            phonemes: hit.phonemes,
            source_pack: hit.source,
        })
    }
}

/// PhonemizeText Handler
pub struct PhonemizeTextHandler {
    resolver: Arc<PronunciationResolver>,
}

impl PhonemizeTextHandler {
    pub fn new(resolver: Arc<PronunciationResolver>) -> Self {
        Self { resolver }
    }

    pub async fn handle(&self, query: PhonemizeText) -> Result<PhonemizedText, ApplicationError> {
        let text = query.text.trim().to_string();
        if text.is_empty() {
            return Err(ApplicationError::validation("text is required"));
        }
        if !self.resolver.has_phonemizer() {
            return Err(ApplicationError::validation("phonemizer not available"));
        }

        let resolver = self.resolver.clone();
        let input = text.clone();
        let phonemes = tokio::task::spawn_blocking(move || resolver.phonemize(&input))
            .await?
            .ok_or_else(|| ApplicationError::validation("unable to phonemize text"))?;
        Ok(PhonemizedText {
            text,
            phonemes,
            backend: PHONEMIZER_SOURCE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pronunciation::{DictPackStore, Phonemizer, ResolverSettings};
    use crate::infrastructure::persistence::FileDictStore;
    use tempfile::tempdir;

    struct EchoPhonemizer;

    impl Phonemizer for EchoPhonemizer {
        fn phonemize(&self, text: &str) -> Option<String> {
            (!text.contains('#')).then(|| format!("/{}/", text))
        }
    }

    fn handler(with_phonemizer: bool) -> PhonemizeTextHandler {
        let dir = tempdir().unwrap();
        let store: Arc<dyn DictPackStore> = Arc::new(FileDictStore::new(
            dir.path().join("missing"),
            dir.path().join("auto_learn.json"),
        ));
        let phonemizer: Option<Arc<dyn Phonemizer>> = if with_phonemizer {
            Some(Arc::new(EchoPhonemizer))
        } else {
            None
        };
        let settings = ResolverSettings {
            enable_autolearn: false,
            ..ResolverSettings::default()
        };
        let resolver = PronunciationResolver::new(settings, store, phonemizer).unwrap();
        PhonemizeTextHandler::new(Arc::new(resolver))
    }

    fn query(text: &str) -> PhonemizeText {
        PhonemizeText {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_phonemize_trims_and_reports_backend() {
        let result = handler(true).handle(query("  hello world ")).await.unwrap();
        assert_eq!(result.text, "hello world");
        assert_eq!(result.phonemes, "/hello world/");
        assert_eq!(result.backend, "espeak");
    }

    #[tokio::test]
    async fn test_phonemize_validation() {
        for (with_phonemizer, text) in [(true, "  "), (false, "hello"), (true, "#")] {
            assert!(matches!(
                handler(with_phonemizer).handle(query(text)).await.unwrap_err(),
                ApplicationError::ValidationError(_)
            ));
        }
    }
}
