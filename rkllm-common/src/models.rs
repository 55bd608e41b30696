//! Model registry and lifecycle wire types (`/v1/models*`).

use serde::{Deserialize, Serialize};

/// One model descriptor as exposed over HTTP. The friendly name is the
/// model's folder name and doubles as the OpenAI `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl ModelInfo {
    pub fn new(friendly_name: String, context_length: u32, size_bytes: u64) -> Self {
        Self {
            id: friendly_name,
            object: "model".to_string(),
            created: chrono::Utc::now().timestamp(),
            owned_by: "local".to_string(),
            context_length: Some(context_length),
            size_bytes: Some(size_bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelListResponse {
    pub fn new(data: Vec<ModelInfo>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLoadRequest {
    pub model: String,
    #[serde(default)]
    pub context_len: Option<u32>,
    #[serde(default)]
    pub num_npu_core: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLoadedResponse {
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_info_new() {
        let info = ModelInfo::new("qwen3-0.6b".to_string(), 4096, 600_000_000);
        assert_eq!(info.id, "qwen3-0.6b");
        assert_eq!(info.object, "model");
        assert_eq!(info.context_length, Some(4096));
    }

    #[test]
    fn test_model_list_response_wraps_object_list() {
        let list = ModelListResponse::new(vec![ModelInfo::new("a".to_string(), 4096, 1)]);
        assert_eq!(list.object, "list");
        assert_eq!(list.data.len(), 1);
    }

    #[test]
    fn test_model_loaded_response_none_when_nothing_loaded() {
        let resp = ModelLoadedResponse { model_name: None };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"model_name":null}"#);
    }
}
