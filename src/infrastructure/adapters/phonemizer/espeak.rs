//! eSpeak NG 音素化器
//!
//! 调用 `espeak-ng --ipa -q`，失败或不可用时返回 None

use std::process::{Command, Stdio};

use crate::domain::pronunciation::Phonemizer;

/// espeak-ng 命令行音素化器
pub struct EspeakPhonemizer {
    binary: String,
    voice: Option<String>,
}

impl EspeakPhonemizer {
    pub fn new(binary: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            voice,
        }
    }

    /// 可执行文件是否可用
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for EspeakPhonemizer {
    fn default() -> Self {
        Self::new("espeak-ng", None)
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn phonemize(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut command = Command::new(&self.binary);
        command.arg("--ipa").arg("-q");
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        let output = match command.arg(text).stderr(Stdio::null()).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(error = %e, binary = %self.binary, "espeak-ng unavailable");
                return None;
            }
        };
        if !output.status.success() {
            tracing::debug!(status = ?output.status.code(), "espeak-ng exited with error");
            return None;
        }

        clean_ipa(&String::from_utf8_lossy(&output.stdout))
    }
}

/// 多行输出合并为一行，去掉首尾空白
fn clean_ipa(raw: &str) -> Option<String> {
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_ipa() {
        assert_eq!(clean_ipa(" həlˈoʊ\n wˈɜːld \n"), Some("həlˈoʊ wˈɜːld".to_string()));
        assert_eq!(clean_ipa("\n  \n"), None);
    }

    #[test]
    fn test_missing_binary_is_none() {
        let phonemizer = EspeakPhonemizer::new("definitely-not-espeak-binary", None);
        assert!(!phonemizer.is_available());
        assert_eq!(phonemizer.phonemize("hello"), None);
    }
}
