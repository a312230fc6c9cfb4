//! Dictionary Queries - 词典查询

/// 列出已加载的词典包
#[derive(Debug, Clone, Default)]
pub struct ListDicts;

/// 查词典（不调用音素化器）
#[derive(Debug, Clone)]
pub struct LookupPronunciation {
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct PronunciationView {
    pub key: String,
    pub phonemes: String,
    pub source_pack: String,
}

/// 直接音素化一段文本（不查词典、不学习）
#[derive(Debug, Clone)]
pub struct PhonemizeText {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct PhonemizedText {
    pub text: String,
    pub phonemes: String,
    pub backend: String,
}
