//! Model Registry: discovers `.rkllm` models under `models_dir`, one
//! directory per friendly name.

use std::path::{Path, PathBuf};

use regex::Regex;

const DEFAULT_CONTEXT_LEN: u32 = 4096;
const MODEL_EXTENSION: &str = "rkllm";

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub friendly_name: String,
    pub path: PathBuf,
    pub context_len: u32,
    pub size_bytes: u64,
}

/// Directory-per-model registry, rebuilt by `discover()`.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    /// Scans `models_dir` for one model file per immediate subdirectory.
    /// Idempotent: running it twice over an unchanged tree yields an equal
    /// set of descriptors.
    pub fn discover(&mut self, models_dir: &Path) -> std::io::Result<()> {
        self.models.clear();

        let entries = match std::fs::read_dir(models_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %models_dir.display(), error = %e, "models directory unreadable");
                return Ok(());
            }
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(friendly_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let mut candidates = Vec::new();
            for file in std::fs::read_dir(&path)? {
                let file = file?;
                let file_path = file.path();
                if file_path.extension().and_then(|e| e.to_str()) == Some(MODEL_EXTENSION) {
                    candidates.push(file_path);
                }
            }

            if candidates.is_empty() {
                continue;
            }
            if candidates.len() > 1 {
                tracing::warn!(
                    model = friendly_name,
                    count = candidates.len(),
                    "multiple model files found, using the first"
                );
            }
            candidates.sort();
            let model_path = candidates.into_iter().next().unwrap();

            let size_bytes = std::fs::metadata(&model_path)?.len();
            let context_len = parse_context_len(&model_path);

            self.models.push(ModelDescriptor {
                friendly_name: friendly_name.to_string(),
                path: model_path,
                context_len,
                size_bytes,
            });
        }

        if self.models.is_empty() {
            tracing::warn!(dir = %models_dir.display(), "no models discovered");
        }

        self.models.sort_by_key(|m| m.size_bytes);
        Ok(())
    }

    /// Ordered ascending by size.
    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Case-insensitive lookup by friendly (folder) name. No fuzzy matching.
    pub fn lookup(&self, identifier: &str) -> Option<&ModelDescriptor> {
        self.models
            .iter()
            .find(|m| m.friendly_name.eq_ignore_ascii_case(identifier))
    }
}

fn parse_context_len(model_path: &Path) -> u32 {
    let Some(filename) = model_path.file_name().and_then(|n| n.to_str()) else {
        return DEFAULT_CONTEXT_LEN;
    };
    let re = Regex::new(r"ctx(\d+)").expect("static regex is valid");
    re.captures(filename)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(DEFAULT_CONTEXT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"fake model bytes").unwrap();
    }

    #[test]
    fn test_parse_context_len_from_filename() {
        let p = PathBuf::from("/models/qwen3-0.6b/qwen3-0.6b-ctx2048.rkllm");
        assert_eq!(parse_context_len(&p), 2048);
    }

    #[test]
    fn test_parse_context_len_defaults_when_absent() {
        let p = PathBuf::from("/models/qwen3-0.6b/qwen3-0.6b.rkllm");
        assert_eq!(parse_context_len(&p), DEFAULT_CONTEXT_LEN);
    }

    #[test]
    fn test_discover_empty_dir_yields_empty_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = ModelRegistry::new();
        registry.discover(tmp.path()).unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_discover_missing_dir_yields_empty_registry() {
        let mut registry = ModelRegistry::new();
        registry.discover(Path::new("/nonexistent/models/dir")).unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_discover_finds_one_model_per_subdir() {
        let tmp = tempfile::tempdir().unwrap();
        let model_dir = tmp.path().join("qwen3-0.6b");
        fs::create_dir(&model_dir).unwrap();
        touch(&model_dir.join("qwen3-0.6b-ctx4096.rkllm"));

        let mut registry = ModelRegistry::new();
        registry.discover(tmp.path()).unwrap();

        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].friendly_name, "qwen3-0.6b");
        assert_eq!(registry.list()[0].context_len, 4096);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let model_dir = tmp.path().join("Qwen3-0.6B");
        fs::create_dir(&model_dir).unwrap();
        touch(&model_dir.join("model.rkllm"));

        let mut registry = ModelRegistry::new();
        registry.discover(tmp.path()).unwrap();

        assert!(registry.lookup("qwen3-0.6b").is_some());
        assert!(registry.lookup("nonexistent").is_none());
    }

    #[test]
    fn test_list_sorted_ascending_by_size() {
        let tmp = tempfile::tempdir().unwrap();

        let small = tmp.path().join("small");
        fs::create_dir(&small).unwrap();
        fs::write(small.join("m.rkllm"), vec![0u8; 10]).unwrap();

        let big = tmp.path().join("big");
        fs::create_dir(&big).unwrap();
        fs::write(big.join("m.rkllm"), vec![0u8; 1000]).unwrap();

        let mut registry = ModelRegistry::new();
        registry.discover(tmp.path()).unwrap();

        let sizes: Vec<u64> = registry.list().iter().map(|m| m.size_bytes).collect();
        assert_eq!(sizes, vec![10, 1000]);
    }

    #[test]
    fn test_discover_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let model_dir = tmp.path().join("qwen3-0.6b");
        fs::create_dir(&model_dir).unwrap();
        touch(&model_dir.join("model.rkllm"));

        let mut registry = ModelRegistry::new();
        registry.discover(tmp.path()).unwrap();
        let first: Vec<String> = registry.list().iter().map(|m| m.friendly_name.clone()).collect();
        registry.discover(tmp.path()).unwrap();
        let second: Vec<String> = registry.list().iter().map(|m| m.friendly_name.clone()).collect();

        assert_eq!(first, second);
    }
}
