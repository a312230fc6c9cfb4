//! Dictionary Commands - 词典写操作

/// 学习方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnMode {
    /// 用音素化器处理 text（缺省为 key）后写入
    Phonemize,
    /// 直接写入给定音素
    Direct,
    /// 音素化 key 并强制写入
    #[default]
    Learn,
}

impl LearnMode {
    /// 未识别的取值按 Learn 处理
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|m| m.trim().to_lowercase()).as_deref() {
            Some("phonemize") => LearnMode::Phonemize,
            Some("direct") => LearnMode::Direct,
            _ => LearnMode::Learn,
        }
    }
}

/// 学习发音命令
#[derive(Debug, Clone)]
pub struct LearnPronunciation {
    pub key: String,
    pub text: Option<String>,
    pub phonemes: Option<String>,
    pub mode: LearnMode,
}

/// 直接教学命令：写入 auto_learn，不受 autolearn_on_miss 影响
#[derive(Debug, Clone)]
pub struct TeachPronunciation {
    pub key: String,
    pub phonemes: String,
}

/// 重新加载词典包
#[derive(Debug, Clone, Default)]
pub struct RefreshDicts;

/// 写入人工覆盖词典包
#[derive(Debug, Clone)]
pub struct OverridePronunciation {
    pub key: String,
    pub phonemes: String,
    /// 只允许 local_overrides
    pub pack: String,
}

/// 将已解析的发音（通常来自 auto_learn）固化到策展词典包
#[derive(Debug, Clone)]
pub struct PromotePronunciation {
    pub key: String,
    pub target_pack: String,
    pub overwrite: bool,
}
