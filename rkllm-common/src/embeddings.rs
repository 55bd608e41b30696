//! OpenAI-compatible embeddings types (`/v1/embeddings`).
//!
//! Embeddings are optional in the core server and gated behind configuration;
//! see `embeddings_enabled` in the server's config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsRequest {
    pub model: String,
    /// A single string or a batch; the server processes inputs sequentially.
    pub input: EmbeddingsInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingsInput {
    Single(String),
    Many(Vec<String>),
}

impl EmbeddingsInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EmbeddingsInput::Single(s) => vec![s],
            EmbeddingsInput::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: EmbeddingsUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub object: String,
    pub index: u32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

impl EmbeddingsResponse {
    pub fn new(model: String, embeddings: Vec<Vec<f32>>, prompt_tokens: u32) -> Self {
        let data = embeddings
            .into_iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingData {
                object: "embedding".to_string(),
                index: index as u32,
                embedding,
            })
            .collect();

        Self {
            object: "list".to_string(),
            data,
            model,
            usage: EmbeddingsUsage {
                prompt_tokens,
                total_tokens: prompt_tokens,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddings_input_single() {
        let input: EmbeddingsInput = serde_json::from_str(r#""hello world""#).unwrap();
        assert_eq!(input.into_vec(), vec!["hello world".to_string()]);
    }

    #[test]
    fn test_embeddings_input_many() {
        let input: EmbeddingsInput = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(input.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_embeddings_response_new() {
        let resp = EmbeddingsResponse::new("qwen3-0.6b".to_string(), vec![vec![0.1, 0.2, 0.3]], 5);
        assert_eq!(resp.object, "list");
        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0].index, 0);
        assert_eq!(resp.usage.prompt_tokens, 5);
    }
}
