//! 文本规范化
//!
//! 片段指纹基于规范化文本计算，大小写、全角字符和引号风格的差异不影响缓存命中。

use unicode_normalization::UnicodeNormalization;

/// 规范化片段文本
///
/// NFKC → 弯引号替换为直引号 → 折叠空白 → 去首尾空白 → 小写
pub fn normalize_text(text: &str) -> String {
    let nfkc: String = text
        .nfkc()
        .map(|ch| match ch {
            '\u{2019}' | '\u{2018}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect();

    nfkc.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_text("  Hello \n\t World  "), "hello world");
    }

    #[test]
    fn test_curly_quotes_become_straight() {
        assert_eq!(
            normalize_text("\u{201C}It\u{2019}s\u{201D} \u{2018}ok\u{2019}"),
            "\"it's\" 'ok'"
        );
    }

    #[test]
    fn test_nfkc_folds_fullwidth() {
        assert_eq!(normalize_text("ＡＢＣ１"), "abc1");
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize_text("   "), "");
    }
}
