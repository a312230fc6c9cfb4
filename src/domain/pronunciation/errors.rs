//! Pronunciation Context - Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictError {
    #[error("词典文件读取错误: {0}")]
    IoError(String),

    #[error("词典格式错误: {0}")]
    ParseError(String),

    #[error("无效的词条: {0}")]
    InvalidEntry(String),

    #[error("词条已存在: {0}")]
    EntryExists(String),

    #[error("音素化不可用")]
    PhonemizerUnavailable,
}
