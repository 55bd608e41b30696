//! Wire types shared between the inference server's HTTP handlers: the
//! OpenAI chat/completions/embeddings shapes, the Ollama generate/chat
//! shapes, and the model-registry and cache-CRUD DTOs layered on top.

pub mod cache;
pub mod chat;
pub mod completions;
pub mod embeddings;
pub mod models;
pub mod ollama;

pub use cache::{AllCachesResponse, CacheInfo, CacheListResponse, CacheSaveRequest, CacheSaveResponse};
pub use chat::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, ChunkDelta, StopSequences, ToolCall, ToolFunction, Usage,
};
pub use completions::{CompletionChoice, CompletionRequest, CompletionResponse};
pub use embeddings::{EmbeddingData, EmbeddingsInput, EmbeddingsRequest, EmbeddingsResponse, EmbeddingsUsage};
pub use models::{HealthResponse, ModelInfo, ModelListResponse, ModelLoadRequest, ModelLoadedResponse};
pub use ollama::{
    OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest, OllamaGenerateResponse,
    OllamaOptions, OllamaTagModel, OllamaTagsResponse,
};
