//! Request Normalizer: maps every wire request shape (OpenAI chat/
//! completions, Ollama generate/chat) into the same resolved generation
//! parameters and prompt string, and maps engine output back to each shape.

use rkllm_common::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChunkChoice,
    ChunkDelta, CompletionRequest, CompletionResponse, OllamaChatRequest, OllamaChatResponse,
    OllamaGenerateRequest, OllamaGenerateResponse,
};

use crate::config::{ChatTemplateConfig, Config};
use crate::inference::{FinishReason, GenerateOutput};

/// Generation parameters resolved from a wire request plus server defaults.
#[derive(Debug, Clone)]
pub struct ResolvedParams {
    pub max_new_tokens: i32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub repeat_penalty: f32,
    pub stop_sequences: Vec<String>,
    pub stream: bool,
}

impl ResolvedParams {
    fn from_defaults(config: &Config) -> Self {
        Self {
            max_new_tokens: config.model_defaults.max_new_tokens,
            temperature: config.inference_params.temperature,
            top_p: config.inference_params.top_p,
            top_k: config.inference_params.top_k,
            repeat_penalty: config.inference_params.repeat_penalty,
            stop_sequences: Vec::new(),
            stream: false,
        }
    }
}

/// Renders a chat message list into the flat prompt string the engine
/// expects, using the configured chat template when its prefixes are set
/// and falling back to a generic `Role: content` transcript otherwise.
pub fn render_chat_prompt(messages: &[ChatMessage], template: &ChatTemplateConfig) -> String {
    if template.user_prefix.is_empty() && template.assistant_prefix.is_empty() {
        let mut out = String::new();
        for m in messages {
            let content = m.content.as_deref().unwrap_or("");
            out.push_str(&capitalize(&m.role));
            out.push_str(": ");
            out.push_str(content);
            out.push('\n');
        }
        out.push_str("Assistant:");
        return out;
    }

    let mut out = String::new();
    if !template.system_prompt.is_empty() {
        out.push_str(&template.system_prompt);
        out.push('\n');
    }
    for m in messages {
        let content = m.content.as_deref().unwrap_or("");
        if m.role == "assistant" {
            out.push_str(&template.assistant_prefix);
        } else {
            out.push_str(&template.user_prefix);
        }
        out.push_str(content);
        out.push_str("\n");
    }
    out.push_str(&template.assistant_prefix);
    out
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn resolve_chat_params(req: &ChatCompletionRequest, config: &Config) -> ResolvedParams {
    let mut params = ResolvedParams::from_defaults(config);
    if let Some(v) = req.max_tokens {
        params.max_new_tokens = v as i32;
    }
    if let Some(v) = req.temperature {
        params.temperature = v;
    }
    if let Some(v) = req.top_p {
        params.top_p = v;
    }
    if let Some(seqs) = req.stop.clone() {
        params.stop_sequences = seqs.into_vec();
    }
    params.stream = req.stream.unwrap_or(false);
    params
}

pub fn resolve_completion_params(req: &CompletionRequest, config: &Config) -> ResolvedParams {
    let mut params = ResolvedParams::from_defaults(config);
    if let Some(v) = req.max_tokens {
        params.max_new_tokens = v as i32;
    }
    if let Some(v) = req.temperature {
        params.temperature = v;
    }
    if let Some(v) = req.top_p {
        params.top_p = v;
    }
    if let Some(seqs) = req.stop.clone() {
        params.stop_sequences = seqs.into_vec();
    }
    params.stream = req.stream.unwrap_or(false);
    params
}

pub fn resolve_ollama_generate_params(req: &OllamaGenerateRequest, config: &Config) -> ResolvedParams {
    let mut params = ResolvedParams::from_defaults(config);
    if let Some(opts) = &req.options {
        if let Some(v) = opts.temperature {
            params.temperature = v;
        }
        if let Some(v) = opts.top_p {
            params.top_p = v;
        }
        if let Some(v) = opts.top_k {
            params.top_k = v as i32;
        }
        if let Some(v) = opts.repeat_penalty {
            params.repeat_penalty = v;
        }
        if let Some(v) = opts.num_predict {
            params.max_new_tokens = v;
        }
        if let Some(seqs) = opts.stop.clone() {
            params.stop_sequences = seqs;
        }
    }
    params.stream = req.stream;
    params
}

pub fn resolve_ollama_chat_params(req: &OllamaChatRequest, config: &Config) -> ResolvedParams {
    let mut params = ResolvedParams::from_defaults(config);
    if let Some(opts) = &req.options {
        if let Some(v) = opts.temperature {
            params.temperature = v;
        }
        if let Some(v) = opts.top_p {
            params.top_p = v;
        }
        if let Some(v) = opts.top_k {
            params.top_k = v as i32;
        }
        if let Some(v) = opts.repeat_penalty {
            params.repeat_penalty = v;
        }
        if let Some(v) = opts.num_predict {
            params.max_new_tokens = v;
        }
        if let Some(seqs) = opts.stop.clone() {
            params.stop_sequences = seqs;
        }
    }
    params.stream = req.stream;
    params
}

fn finish_reason_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
    }
}

pub fn prompt_tokens_estimate(prompt: &str) -> u32 {
    // No tokenizer is exposed over this FFI surface; approximate from text
    // length the way the upstream Python service logs it for usage stats.
    (prompt.chars().count() / 4).max(1) as u32
}

pub fn chat_response(model: &str, prompt: &str, output: &GenerateOutput) -> ChatCompletionResponse {
    let message = ChatMessage {
        role: "assistant".to_string(),
        content: Some(output.text.clone()),
        tool_calls: None,
        tool_call_id: None,
    };
    let finish_reason = finish_reason_str(output.finish_reason).to_string();
    let prompt_tokens = prompt_tokens_estimate(prompt);
    let completion_tokens = output.perf.generate_tokens.max(0) as u32;

    let mut response = ChatCompletionResponse::new(model.to_string(), message, Some(finish_reason))
        .with_usage(prompt_tokens, completion_tokens);
    if let Some(usage) = response.usage.as_mut() {
        usage.cache_hit = Some(output.used_cached_prefix);
        usage.prefill_time_ms = Some(output.perf.prefill_time_ms as f64);
        usage.generate_time_ms = Some(output.perf.generate_time_ms as f64);
    }
    response
}

pub fn completion_response(model: &str, prompt: &str, output: &GenerateOutput) -> CompletionResponse {
    let finish_reason = finish_reason_str(output.finish_reason).to_string();
    let prompt_tokens = prompt_tokens_estimate(prompt);
    let completion_tokens = output.perf.generate_tokens.max(0) as u32;
    CompletionResponse::new(model.to_string(), output.text.clone(), Some(finish_reason))
        .with_usage(prompt_tokens, completion_tokens)
}

pub fn ollama_generate_response(
    model: &str,
    prompt: &str,
    output: &GenerateOutput,
) -> OllamaGenerateResponse {
    let prompt_tokens = prompt_tokens_estimate(prompt);
    let completion_tokens = output.perf.generate_tokens.max(0) as u32;
    OllamaGenerateResponse::new(model.to_string(), output.text.clone(), true)
        .with_stats(
            prompt_tokens,
            output.perf.prefill_time_ms as f64,
            completion_tokens,
            output.perf.generate_time_ms as f64,
        )
}

pub fn ollama_chat_response(model: &str, output: &GenerateOutput) -> OllamaChatResponse {
    let message = ChatMessage {
        role: "assistant".to_string(),
        content: Some(output.text.clone()),
        tool_calls: None,
        tool_call_id: None,
    };
    let mut response = OllamaChatResponse::new(model.to_string(), message, true);
    let completion_tokens = output.perf.generate_tokens.max(0) as u32;
    response.eval_count = Some(completion_tokens);
    response.eval_duration = Some((output.perf.generate_time_ms as f64 * 1_000_000.0) as u64);
    response.prompt_eval_count = Some(output.perf.prefill_tokens.max(0) as u32);
    response.prompt_eval_duration = Some((output.perf.prefill_time_ms as f64 * 1_000_000.0) as u64);
    response
}

/// JSON body of one streamed chat completion token chunk. The SSE envelope
/// (`data: <json>\n\n`) is assembled by the HTTP layer, not here.
pub fn chat_chunk_json(id: &str, model: &str, created: i64, delta_content: String) -> String {
    let chunk = ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: None,
                content: Some(delta_content),
            },
            finish_reason: None,
        }],
        usage: None,
    };
    serde_json::to_string(&chunk).unwrap()
}

/// JSON body of the terminal chunk carrying `finish_reason`. The caller
/// follows this with a literal `[DONE]` event.
pub fn chat_final_chunk_json(id: &str, model: &str, created: i64, output: &GenerateOutput) -> String {
    let chunk = ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some(finish_reason_str(output.finish_reason).to_string()),
        }],
        usage: None,
    };
    serde_json::to_string(&chunk).unwrap()
}

/// JSON body of one streamed legacy-completion token chunk.
pub fn completion_chunk_json(id: &str, model: &str, created: i64, delta_text: String) -> String {
    let chunk = CompletionResponse {
        id: id.to_string(),
        object: "text_completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![rkllm_common::CompletionChoice { index: 0, text: delta_text, finish_reason: None }],
        usage: None,
    };
    serde_json::to_string(&chunk).unwrap()
}

/// JSON body of the terminal legacy-completion chunk carrying `finish_reason`.
pub fn completion_final_chunk_json(id: &str, model: &str, created: i64, output: &GenerateOutput) -> String {
    let chunk = CompletionResponse {
        id: id.to_string(),
        object: "text_completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![rkllm_common::CompletionChoice {
            index: 0,
            text: String::new(),
            finish_reason: Some(finish_reason_str(output.finish_reason).to_string()),
        }],
        usage: None,
    };
    serde_json::to_string(&chunk).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_msg(content: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn test_render_chat_prompt_uses_configured_prefixes() {
        let template = ChatTemplateConfig::default();
        let prompt = render_chat_prompt(&[user_msg("hi there")], &template);
        assert!(prompt.starts_with(&template.user_prefix));
        assert!(prompt.ends_with(&template.assistant_prefix));
        assert!(prompt.contains("hi there"));
    }

    #[test]
    fn test_render_chat_prompt_falls_back_to_role_transcript() {
        let template = ChatTemplateConfig {
            system_prompt: String::new(),
            user_prefix: String::new(),
            assistant_prefix: String::new(),
        };
        let prompt = render_chat_prompt(&[user_msg("hi there")], &template);
        assert_eq!(prompt, "User: hi there\nAssistant:");
    }

    #[test]
    fn test_resolve_chat_params_overrides_defaults() {
        let config = Config::default();
        let req = ChatCompletionRequest {
            messages: vec![user_msg("hi")],
            tools: None,
            model: None,
            temperature: Some(0.2),
            top_p: None,
            max_tokens: Some(16),
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            stream: Some(true),
            use_cache: None,
            save_cache: None,
        };
        let params = resolve_chat_params(&req, &config);
        assert_eq!(params.max_new_tokens, 16);
        assert_eq!(params.temperature, 0.2);
        assert!(params.stream);
    }

    #[test]
    fn test_resolve_ollama_generate_params_reads_nested_options() {
        let config = Config::default();
        let req: OllamaGenerateRequest = serde_json::from_str(
            r#"{"model": "m", "prompt": "hi", "options": {"num_predict": 64, "top_k": 10}}"#,
        )
        .unwrap();
        let params = resolve_ollama_generate_params(&req, &config);
        assert_eq!(params.max_new_tokens, 64);
        assert_eq!(params.top_k, 10);
    }

    #[test]
    fn test_finish_reason_maps_length_and_stop() {
        assert_eq!(finish_reason_str(FinishReason::Stop), "stop");
        assert_eq!(finish_reason_str(FinishReason::Length), "length");
    }

    #[test]
    fn test_prompt_tokens_estimate_never_zero_for_nonempty_prompt() {
        assert!(prompt_tokens_estimate("a") >= 1);
    }

    #[test]
    fn test_chat_chunk_json_carries_delta_content() {
        let json = chat_chunk_json("chatcmpl-1", "qwen3-0.6b", 0, "hi".to_string());
        assert!(json.contains(r#""content":"hi""#));
        assert!(json.contains("chat.completion.chunk"));
    }
}
