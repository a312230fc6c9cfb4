//! 文本分块器
//!
//! 将原始文本切分为有序、长度受限的片段：
//! 段落 → 句子 → 超长句按词折行 → 贪心打包，最后合并过短片段。
//! 分块基于原始文本（保留标点/韵律），规范化在之后逐片段进行。

/// 默认软目标长度（字符数）
pub const DEFAULT_TARGET_CHARS: usize = 300;

/// 默认硬上限（字符数）
pub const DEFAULT_MAX_CHARS: usize = 500;

/// 默认最小片段长度（字符数）
pub const DEFAULT_MIN_CHARS: usize = 60;

/// 文本分块配置
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 软目标长度，打包时尽量不超过
    pub target_chars: usize,
    /// 硬上限，只有单个超长词可以突破
    pub max_chars: usize,
    /// 最小长度，低于此值的片段会被合并到相邻片段
    pub min_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_chars: DEFAULT_TARGET_CHARS,
            max_chars: DEFAULT_MAX_CHARS,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 检查是否为句末标点
#[inline]
fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

/// 按空行分割段落
///
/// 只包含空白的行视为段落分隔
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                let joined = current.join("\n");
                let trimmed = joined.trim();
                if !trimmed.is_empty() {
                    paragraphs.push(trimmed.to_string());
                }
                current.clear();
            }
            continue;
        }
        current.push(line);
    }

    if !current.is_empty() {
        let joined = current.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            paragraphs.push(trimmed.to_string());
        }
    }

    paragraphs
}

/// 按句末标点后的空白分割句子
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;
    let mut skipping = false;

    for ch in paragraph.chars() {
        if ch.is_whitespace() {
            if skipping {
                continue;
            }
            if prev.map(is_sentence_end).unwrap_or(false) {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
                skipping = true;
                continue;
            }
        } else {
            skipping = false;
        }
        current.push(ch);
        prev = Some(ch);
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// 对超长句子按任意空白折行
///
/// 单个超长词会被单独输出
fn split_long_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    if char_len(sentence) <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for token in sentence.split_whitespace() {
        let token_len = char_len(token);
        if current.is_empty() {
            current.push_str(token);
            current_len = token_len;
            continue;
        }
        if current_len + 1 + token_len <= max_chars {
            current.push(' ');
            current.push_str(token);
            current_len += 1 + token_len;
        } else {
            parts.push(std::mem::take(&mut current));
            current.push_str(token);
            current_len = token_len;
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// 将一个段落的句子贪心打包成块
fn chunk_paragraph(paragraph: &str, target_chars: usize, max_chars: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    for sentence in split_sentences(paragraph) {
        sentences.extend(split_long_sentence(&sentence, max_chars));
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences {
        let sentence_len = char_len(&sentence);
        if current.is_empty() {
            current = sentence;
            current_len = sentence_len;
            continue;
        }

        let candidate_len = current_len + 1 + sentence_len;
        // 未超过软目标，或当前块仍低于目标且不超过硬上限
        let fits = candidate_len <= target_chars
            || (candidate_len <= max_chars && current_len < target_chars);

        if fits {
            current.push(' ');
            current.push_str(&sentence);
            current_len = candidate_len;
        } else {
            chunks.push(std::mem::replace(&mut current, sentence));
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// 对文本进行分块
///
/// 分块策略：
/// 1. 按空行分段
/// 2. 段内按句末标点分句，超长句按词折行
/// 3. 贪心打包：不超过 target_chars，或当前块未达 target 且不超过 max_chars
pub fn chunk_text(text: &str, target_chars: usize, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for paragraph in split_paragraphs(text) {
        chunks.extend(chunk_paragraph(&paragraph, target_chars, max_chars));
    }
    chunks
}

fn join_trimmed(left: &str, right: &str) -> String {
    format!("{} {}", left, right).trim().to_string()
}

/// 合并过短的片段
///
/// 两轮：短片段优先并入前一个输出片段，没有前一个则与下一个合并，
/// 都没有则单独保留。非空输入不会产生空结果。
pub fn merge_small_segments(segments: Vec<String>, min_chars: usize) -> Vec<String> {
    if min_chars == 0 || segments.len() <= 1 {
        return segments;
    }

    let merged = merge_pass(&segments, min_chars);
    if merged.len() <= 1 {
        return merged;
    }

    merge_pass(&merged, min_chars)
}

fn merge_pass(segments: &[String], min_chars: usize) -> Vec<String> {
    let mut output: Vec<String> = Vec::with_capacity(segments.len());
    let mut i = 0;

    while i < segments.len() {
        let segment = segments[i].trim();
        if char_len(segment) < min_chars {
            if let Some(last) = output.last_mut() {
                *last = join_trimmed(last, segment);
            } else if i + 1 < segments.len() {
                output.push(join_trimmed(segment, &segments[i + 1]));
                i += 1;
            } else {
                output.push(segment.to_string());
            }
        } else {
            output.push(segment.to_string());
        }
        i += 1;
    }

    output
}

/// 分块并合并短片段（便捷方法）
pub fn chunk_and_merge(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chunks = chunk_text(text, config.target_chars, config.max_chars);
    merge_small_segments(chunks, config.min_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 300, 500).is_empty());
        assert!(chunk_text("   \n\n  ", 300, 500).is_empty());
        assert!(chunk_and_merge("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_long_sentence_is_word_wrapped() {
        let text = "word ".repeat(50);
        let chunks = chunk_text(text.trim(), 40, 50);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| char_len(c) <= 50));
    }

    #[test]
    fn test_sentence_boundaries_kept_when_possible() {
        let a = "This is sentence one with enough words.";
        let b = "This is sentence two with enough words.";
        let text = format!("{} {}", a, b);

        let chunks = chunk_text(&text, 30, 45);
        assert_eq!(chunks, vec![a.to_string(), b.to_string()]);
    }

    #[test]
    fn test_short_sentences_packed_up_to_target() {
        let chunks = chunk_text("One. Two. Three.", 300, 500);
        assert_eq!(chunks, vec!["One. Two. Three.".to_string()]);
    }

    #[test]
    fn test_paragraphs_never_share_a_chunk() {
        let chunks = chunk_text("First paragraph.\n\n  \nSecond paragraph.", 300, 500);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "First paragraph.");
        assert_eq!(chunks[1], "Second paragraph.");
    }

    #[test]
    fn test_oversized_word_emitted_alone() {
        let long_word = "x".repeat(80);
        let text = format!("short words {} tail", long_word);
        let chunks = chunk_text(&text, 20, 30);

        assert!(chunks.contains(&long_word));
    }

    #[test]
    fn test_chunks_bounded_and_preserve_content() {
        let text = "Gojo Satoru arrives at the school. He looks around!\n\n\
                    Nobody answers? The wind blows across the empty field while the \
                    students wait for instructions from their coach, who is late again.";
        for (target, max) in [(20, 40), (60, 80), (300, 500)] {
            let chunks = chunk_text(text, target, max);
            assert!(chunks.iter().all(|c| char_len(c) <= max), "max={}", max);
            assert_eq!(non_whitespace(&chunks.concat()), non_whitespace(text));
        }
    }

    #[test]
    fn test_newline_and_tab_separated_words_are_wrapped() {
        let inputs = [
            "word\n".repeat(200),
            "word\t".repeat(200),
            "alpha\tbeta\ngamma ".repeat(80),
        ];
        for text in inputs {
            let chunks = chunk_text(&text, 300, 500);
            let lens: Vec<usize> = chunks.iter().map(|c| char_len(c)).collect();
            assert!(chunks.len() > 1, "{:?}", lens);
            assert!(lens.iter().all(|&n| n <= 500), "{:?}", lens);
            assert_eq!(non_whitespace(&chunks.concat()), non_whitespace(&text));
        }
    }

    #[test]
    fn test_single_short_input_is_unchanged() {
        let text = "A single sentence that is comfortably above the minimum length.";
        let config = ChunkConfig {
            target_chars: 300,
            max_chars: 500,
            min_chars: 10,
        };
        assert_eq!(chunk_and_merge(text, &config), vec![text.to_string()]);
    }

    #[test]
    fn test_merge_small_segments_merges_with_next() {
        let segments = vec!["tiny".to_string(), "this is a longer segment".to_string()];
        let merged = merge_small_segments(segments, 10);

        assert_eq!(merged.len(), 1);
        assert!(merged[0].starts_with("tiny"));
    }

    #[test]
    fn test_merge_small_segments_merges_with_previous() {
        let segments = vec!["this is a longer segment".to_string(), "tiny".to_string()];
        let merged = merge_small_segments(segments, 10);

        assert_eq!(merged.len(), 1);
        assert!(merged[0].starts_with("this is a longer segment"));
    }

    #[test]
    fn test_merge_small_segments_keeps_single_segment() {
        let segments = vec!["short".to_string()];
        assert_eq!(merge_small_segments(segments.clone(), 10), segments);
    }

    #[test]
    fn test_merge_never_empties_nonempty_input() {
        let segments = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let merged = merge_small_segments(segments, 100);

        assert_eq!(merged, vec!["a b c".to_string()]);
    }
}
