//! Cache Store: binary prompt-cache blobs plus JSON sidecar metadata,
//! one subdirectory per model.

use std::path::PathBuf;

use regex::Regex;
use rkllm_common::CacheInfo;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const PROTECTED_CACHE_NAME: &str = "system";
const CACHE_EXTENSION: &str = "rkllm_cache";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    cache_name: String,
    model_name: String,
    created_at: f64,
    prompt_length: usize,
    source: String,
    #[serde(default)]
    ttft_ms: Option<f64>,
}

pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn validate_name(name: &str) -> Result<()> {
        let re = Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex is valid");
        if !re.is_match(name) {
            return Err(Error::CachePathInvalid(format!(
                "cache name '{name}' must match [A-Za-z0-9_-]+"
            )));
        }
        Ok(())
    }

    fn model_dir(&self, model: &str) -> PathBuf {
        self.root.join(model)
    }

    pub fn path(&self, model: &str, name: &str) -> PathBuf {
        self.model_dir(model).join(format!("{name}.{CACHE_EXTENSION}"))
    }

    fn sidecar_path(&self, model: &str, name: &str) -> PathBuf {
        self.model_dir(model).join(format!("{name}.json"))
    }

    pub fn exists(&self, model: &str, name: &str) -> bool {
        self.path(model, name).exists()
    }

    pub fn info(&self, model: &str, name: &str) -> Result<Option<CacheInfo>> {
        let sidecar_path = self.sidecar_path(model, name);
        if !sidecar_path.exists() {
            if self.exists(model, name) {
                // Blob with no sidecar: report what we can, source unknown.
                let size_bytes = std::fs::metadata(self.path(model, name))
                    .map(|m| m.len())
                    .ok();
                return Ok(Some(CacheInfo {
                    cache_name: name.to_string(),
                    model_name: model.to_string(),
                    created_at: 0.0,
                    prompt_length: 0,
                    source: "unknown".to_string(),
                    ttft_ms: None,
                    size_bytes,
                }));
            }
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&sidecar_path)
            .map_err(|e| Error::Internal(format!("failed to read cache sidecar: {e}")))?;
        let sidecar: Sidecar = serde_json::from_str(&raw)
            .map_err(|e| Error::Internal(format!("failed to parse cache sidecar: {e}")))?;
        let size_bytes = std::fs::metadata(self.path(model, name)).map(|m| m.len()).ok();

        Ok(Some(CacheInfo {
            cache_name: sidecar.cache_name,
            model_name: sidecar.model_name,
            created_at: sidecar.created_at,
            prompt_length: sidecar.prompt_length,
            source: sidecar.source,
            ttft_ms: sidecar.ttft_ms,
            size_bytes,
        }))
    }

    pub fn save_metadata(
        &self,
        model: &str,
        name: &str,
        prompt_length: usize,
        source: &str,
        ttft_ms: Option<f64>,
        created_at: f64,
    ) -> Result<()> {
        Self::validate_name(name)?;
        let dir = self.model_dir(model);
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Internal(format!("failed to create cache dir: {e}")))?;

        let sidecar = Sidecar {
            cache_name: name.to_string(),
            model_name: model.to_string(),
            created_at,
            prompt_length,
            source: source.to_string(),
            ttft_ms,
        };
        let json = serde_json::to_string_pretty(&sidecar)
            .map_err(|e| Error::Internal(format!("failed to serialize cache sidecar: {e}")))?;
        std::fs::write(self.sidecar_path(model, name), json)
            .map_err(|e| Error::Internal(format!("failed to write cache sidecar: {e}")))?;
        Ok(())
    }

    pub fn delete(&self, model: &str, name: &str) -> Result<bool> {
        if name == PROTECTED_CACHE_NAME {
            return Err(Error::CachePathInvalid(
                "the 'system' cache is protected and cannot be deleted".to_string(),
            ));
        }
        let mut deleted = false;
        let blob = self.path(model, name);
        if blob.exists() {
            std::fs::remove_file(&blob)
                .map_err(|e| Error::Internal(format!("failed to delete cache blob: {e}")))?;
            deleted = true;
        }
        let sidecar = self.sidecar_path(model, name);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)
                .map_err(|e| Error::Internal(format!("failed to delete cache sidecar: {e}")))?;
            deleted = true;
        }
        Ok(deleted)
    }

    pub fn list(&self, model: &str) -> Result<Vec<CacheInfo>> {
        let dir = self.model_dir(model);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut caches = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .map_err(|e| Error::Internal(format!("failed to list cache dir: {e}")))?
        {
            let entry = entry.map_err(|e| Error::Internal(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(info) = self.info(model, name)? {
                caches.push(info);
            }
        }
        caches.sort_by(|a, b| b.created_at.partial_cmp(&a.created_at).unwrap());
        Ok(caches)
    }

    pub fn list_all(&self) -> Result<std::collections::HashMap<String, Vec<CacheInfo>>> {
        let mut all = std::collections::HashMap::new();
        if !self.root.exists() {
            return Ok(all);
        }
        for entry in std::fs::read_dir(&self.root)
            .map_err(|e| Error::Internal(format!("failed to list cache root: {e}")))?
        {
            let entry = entry.map_err(|e| Error::Internal(e.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(model_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let caches = self.list(model_name)?;
            if !caches.is_empty() {
                all.insert(model_name.to_string(), caches);
            }
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_rejects_path_traversal() {
        assert!(CacheStore::validate_name("../etc/passwd").is_err());
        assert!(CacheStore::validate_name("sys tem").is_err());
    }

    #[test]
    fn test_validate_name_accepts_alnum_dash_underscore() {
        assert!(CacheStore::validate_name("system").is_ok());
        assert!(CacheStore::validate_name("coding-rules_v2").is_ok());
    }

    #[test]
    fn test_save_and_load_metadata_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        std::fs::create_dir_all(store.path("qwen3-0.6b", "sys").parent().unwrap()).unwrap();
        std::fs::write(store.path("qwen3-0.6b", "sys"), b"fake-blob").unwrap();

        store
            .save_metadata("qwen3-0.6b", "sys", 1000, "api", Some(12.5), 1_700_000_000.0)
            .unwrap();

        let info = store.info("qwen3-0.6b", "sys").unwrap().unwrap();
        assert_eq!(info.prompt_length, 1000);
        assert_eq!(info.source, "api");
        assert_eq!(info.ttft_ms, Some(12.5));
    }

    #[test]
    fn test_system_cache_cannot_be_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        let dir = tmp.path().join("qwen3-0.6b");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(store.path("qwen3-0.6b", "system"), b"x").unwrap();

        let result = store.delete("qwen3-0.6b", "system");
        assert!(result.is_err());
        assert!(store.exists("qwen3-0.6b", "system"));
    }

    #[test]
    fn test_delete_nonprotected_cache_removes_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        let dir = tmp.path().join("qwen3-0.6b");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(store.path("qwen3-0.6b", "scratch"), b"x").unwrap();
        store
            .save_metadata("qwen3-0.6b", "scratch", 10, "api", None, 0.0)
            .unwrap();

        assert!(store.delete("qwen3-0.6b", "scratch").unwrap());
        assert!(!store.exists("qwen3-0.6b", "scratch"));
    }

    #[test]
    fn test_list_orders_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        let dir = tmp.path().join("qwen3-0.6b");
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(store.path("qwen3-0.6b", "old"), b"x").unwrap();
        store
            .save_metadata("qwen3-0.6b", "old", 1, "api", None, 100.0)
            .unwrap();
        std::fs::write(store.path("qwen3-0.6b", "new"), b"x").unwrap();
        store
            .save_metadata("qwen3-0.6b", "new", 1, "api", None, 200.0)
            .unwrap();

        let caches = store.list("qwen3-0.6b").unwrap();
        assert_eq!(caches[0].cache_name, "new");
        assert_eq!(caches[1].cache_name, "old");
    }

    #[test]
    fn test_list_all_groups_by_model() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CacheStore::new(tmp.path());
        let dir = tmp.path().join("qwen3-0.6b");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(store.path("qwen3-0.6b", "sys"), b"x").unwrap();
        store
            .save_metadata("qwen3-0.6b", "sys", 1, "api", None, 0.0)
            .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all["qwen3-0.6b"].len(), 1);
    }
}
