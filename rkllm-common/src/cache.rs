//! Binary prompt cache CRUD wire types (`/v1/cache*`).

use serde::{Deserialize, Serialize};

/// Sidecar metadata for one binary cache blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    pub cache_name: String,
    pub model_name: String,
    pub created_at: f64,
    pub prompt_length: usize,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSaveRequest {
    pub cache_name: String,
    pub prompt: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSaveResponse {
    pub cache_name: String,
    pub model_name: String,
    pub size_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheListResponse {
    pub model_name: String,
    pub caches: Vec<CacheInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllCachesResponse {
    pub models: std::collections::HashMap<String, Vec<CacheInfo>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_info_roundtrip() {
        let info = CacheInfo {
            cache_name: "system".to_string(),
            model_name: "qwen3-0.6b".to_string(),
            created_at: 1_700_000_000.0,
            prompt_length: 128,
            source: "api".to_string(),
            ttft_ms: Some(12.5),
            size_bytes: Some(4096),
        };
        let json = serde_json::to_string(&info).unwrap();
        let parsed: CacheInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cache_name, "system");
        assert_eq!(parsed.prompt_length, 128);
    }

    #[test]
    fn test_cache_save_request_without_source() {
        let json = r#"{"cache_name": "sys", "prompt": "you are a helpful assistant"}"#;
        let req: CacheSaveRequest = serde_json::from_str(json).unwrap();
        assert!(req.source.is_none());
    }

    #[test]
    fn test_all_caches_response_groups_by_model() {
        let mut models = std::collections::HashMap::new();
        models.insert(
            "qwen3-0.6b".to_string(),
            vec![CacheInfo {
                cache_name: "system".to_string(),
                model_name: "qwen3-0.6b".to_string(),
                created_at: 0.0,
                prompt_length: 1,
                source: "api".to_string(),
                ttft_ms: None,
                size_bytes: None,
            }],
        );
        let resp = AllCachesResponse { models };
        assert_eq!(resp.models["qwen3-0.6b"].len(), 1);
    }
}
