//! 词典包文件存储
//!
//! 词典目录下的 *.json 均视为词典包，新版本写为 `{name}_v{version}.json`；
//! 自动学习词典单独存放。写入均通过临时文件 + 改名完成

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::domain::pronunciation::{is_valid_pack_name, DictError, DictPackStore};

/// JSON 文件词典存储
pub struct FileDictStore {
    dict_dir: PathBuf,
    autolearn_path: PathBuf,
}

impl FileDictStore {
    pub fn new(dict_dir: impl Into<PathBuf>, autolearn_path: impl Into<PathBuf>) -> Self {
        Self {
            dict_dir: dict_dir.into(),
            autolearn_path: autolearn_path.into(),
        }
    }

    pub fn dict_dir(&self) -> &Path {
        &self.dict_dir
    }

    fn read_json(path: &Path) -> Result<Value, DictError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DictError::IoError(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| DictError::ParseError(format!("{}: {}", path.display(), e)))
    }

    fn write_atomic(path: &Path, payload: &Value) -> Result<(), DictError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DictError::IoError(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(payload)
            .map_err(|e| DictError::ParseError(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| DictError::IoError(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| DictError::IoError(e.to_string()))?;
        Ok(())
    }

    fn is_autolearn(&self, path: &Path) -> bool {
        match (path.canonicalize(), self.autolearn_path.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => path == self.autolearn_path,
        }
    }
}

impl DictPackStore for FileDictStore {
    fn load_pack_files(&self) -> Result<Vec<Value>, DictError> {
        let entries = match std::fs::read_dir(&self.dict_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %self.dict_dir.display(), "Dictionary directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(DictError::IoError(e.to_string())),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
            .filter(|p| !self.is_autolearn(p))
            .collect();
        paths.sort();

        let mut packs = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read_json(&path) {
                Ok(payload) => packs.push(payload),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable dictionary pack"),
            }
        }
        Ok(packs)
    }

    fn load_autolearn(&self) -> Result<Option<Value>, DictError> {
        if !self.autolearn_path.exists() {
            return Ok(None);
        }
        Self::read_json(&self.autolearn_path).map(Some)
    }

    fn save_autolearn(&self, payload: &Value) -> Result<(), DictError> {
        Self::write_atomic(&self.autolearn_path, payload)
    }

    fn save_pack(&self, payload: &Value) -> Result<(), DictError> {
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| is_valid_pack_name(n))
            .ok_or_else(|| DictError::InvalidEntry("pack name".to_string()))?;
        let version = payload
            .get("version")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| DictError::InvalidEntry(format!("{} version", name)))?;

        let path = self.dict_dir.join(format!("{}_v{}.json", name, version));
        Self::write_atomic(&path, payload)?;
        tracing::debug!(path = %path.display(), "Dictionary pack written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_loads_packs_and_skips_autolearn() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("en_core.json"),
            json!({"name": "en_core", "version": "1.0.0", "entries": {"hello": "həloʊ"}}).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = FileDictStore::new(dir.path(), dir.path().join("auto_learn.json"));
        store
            .save_autolearn(&json!({"name": "auto_learn", "entries": {}}))
            .unwrap();

        let packs = store.load_pack_files().unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0]["name"], "en_core");
        assert!(store.load_autolearn().unwrap().is_some());
    }

    #[test]
    fn test_save_pack_writes_versioned_file() {
        let dir = tempdir().unwrap();
        let store = FileDictStore::new(dir.path().join("dicts"), dir.path().join("auto_learn.json"));
        for version in ["1.0.1", "1.0.10", "1.0.2"] {
            store
                .save_pack(&json!({
                    "name": "local_overrides",
                    "version": version,
                    "entries": {"gojo": version},
                }))
                .unwrap();
        }
        assert!(dir.path().join("dicts/local_overrides_v1.0.10.json").exists());

        let latest = store.load_pack("local_overrides").unwrap().unwrap();
        assert_eq!(latest["version"], "1.0.10");
        assert!(store.load_pack("anime_en").unwrap().is_none());

        assert!(store
            .save_pack(&json!({"name": "../escape", "version": "1.0.0"}))
            .is_err());
        assert!(store
            .save_pack(&json!({"name": "local_overrides", "version": "x/y"}))
            .is_err());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileDictStore::new(dir.path().join("none"), dir.path().join("none/a.json"));
        assert!(store.load_pack_files().unwrap().is_empty());
        assert!(store.load_autolearn().unwrap().is_none());
    }
}
