//! Inference Engine: owns one loaded NPU handle and drives the native
//! callback-based generation protocol.

use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ffi::{
    self, RkllmExtendParam, RkllmHandle, RkllmInferParam, RkllmInput, RkllmInputUnion, RkllmParam,
    RkllmPerfStat, RkllmPromptCacheParam, RkllmResult, LLM_RUN_ERROR, LLM_RUN_FINISH,
    LLM_RUN_NORMAL, RKLLM_INFER_GENERATE, RKLLM_INFER_GET_LAST_HIDDEN_LAYER, RKLLM_INPUT_PROMPT,
};

const DEFAULT_STOP_SEQUENCES: &[&str] = &["<|im_end|>", "<|endoftext|>"];
const STOP_TAIL_CHARS: usize = 256;

/// Why a generation call stopped producing tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model emitted a stop sequence (or the runtime's own EOS) naturally.
    Stop,
    /// The configured `max_new_tokens` cap was reached.
    Length,
}

/// Mutable generation state touched only by the native callback thread while
/// a `generate` call is in flight; read by the calling thread only after
/// the handle reports `FINISH`/`ERROR`.
struct CallbackState {
    accumulator: String,
    token_callback: Option<Box<dyn Fn(&str) + Send>>,
    max_tokens: i32,
    tokens_emitted: i32,
    stop_sequences: Vec<String>,
    terminal: Option<std::result::Result<(), String>>,
    perf: RkllmPerfStat,
    embedding: Option<Vec<f32>>,
    embedding_mode: bool,
    finish_reason: Option<FinishReason>,
}

impl CallbackState {
    fn new(max_tokens: i32, stop_sequences: Vec<String>) -> Self {
        Self {
            accumulator: String::new(),
            token_callback: None,
            max_tokens,
            tokens_emitted: 0,
            stop_sequences,
            terminal: None,
            perf: RkllmPerfStat::default(),
            embedding: None,
            embedding_mode: false,
            finish_reason: None,
        }
    }

    /// Returns true if generation should halt after this token; records
    /// which policy fired so the caller can report an accurate finish reason.
    fn apply_stop_policy(&mut self) -> bool {
        if self.max_tokens > 0 && self.tokens_emitted >= self.max_tokens {
            self.finish_reason = Some(FinishReason::Length);
            return true;
        }
        let mut tail_start = self
            .accumulator
            .len()
            .saturating_sub(STOP_TAIL_CHARS.max(
                self.stop_sequences.iter().map(|s| s.len()).max().unwrap_or(0),
            ));
        while !self.accumulator.is_char_boundary(tail_start) {
            tail_start += 1;
        }
        let tail = &self.accumulator[tail_start..];
        if self.stop_sequences.iter().any(|seq| tail.contains(seq.as_str())) {
            self.finish_reason = Some(FinishReason::Stop);
            return true;
        }
        false
    }
}

/// One NPU handle plus the smart-prefix context and shared callback state.
pub struct RkllmEngine {
    handle: RkllmHandle,
    state: Arc<Mutex<CallbackState>>,
    npu_context: Mutex<String>,
    model_name: String,
    context_len: u32,
}

unsafe impl Send for RkllmEngine {}
unsafe impl Sync for RkllmEngine {}

/// Userdata pointer handed to the native callback: a raw clone of the `Arc`
/// pointer, reconstituted inside the trampoline. Kept alive by the engine
/// for the handle's full lifetime.
struct CallbackUserdata {
    state: Arc<Mutex<CallbackState>>,
}

extern "C" fn generation_trampoline(
    result: *const RkllmResult,
    userdata: *mut c_void,
    call_state: c_int,
) -> c_int {
    if userdata.is_null() {
        return 0;
    }
    let userdata = unsafe { &*(userdata as *const CallbackUserdata) };
    let mut state = match userdata.state.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };

    if call_state == LLM_RUN_ERROR {
        state.terminal = Some(Err("native runtime reported an error".to_string()));
        return 0;
    }

    if state.embedding_mode {
        if call_state != LLM_RUN_FINISH {
            return 0;
        }
        let Some(r) = (unsafe { result.as_ref() }) else {
            state.terminal = Some(Err("no result in FINISH callback".to_string()));
            return 0;
        };
        let layer = &r.last_hidden_layer;
        if layer.hidden_states.is_null() || layer.num_tokens <= 0 {
            state.terminal = Some(Err("no hidden states returned".to_string()));
            return 0;
        }
        let embd_size = layer.embd_size as usize;
        let num_tokens = layer.num_tokens as usize;
        let offset = (num_tokens - 1) * embd_size;
        let slice = unsafe { std::slice::from_raw_parts(layer.hidden_states.add(offset), embd_size) };
        let norm = slice.iter().map(|x| x * x).sum::<f32>().sqrt();
        let embedding = if norm > 0.0 {
            slice.iter().map(|x| x / norm).collect()
        } else {
            slice.to_vec()
        };
        state.embedding = Some(embedding);
        state.terminal = Some(Ok(()));
        return 0;
    }

    if call_state == LLM_RUN_FINISH {
        if let Some(r) = unsafe { result.as_ref() } {
            state.perf = r.perf;
        }
        if state.finish_reason.is_none() {
            state.finish_reason = Some(FinishReason::Stop);
        }
        state.terminal = Some(Ok(()));
        return 0;
    }
    if call_state != LLM_RUN_NORMAL {
        return 0;
    }

    let Some(r) = (unsafe { result.as_ref() }) else {
        return 0;
    };
    if r.text.is_null() {
        return 0;
    }
    let text = unsafe { CStr::from_ptr(r.text) }.to_string_lossy().into_owned();
    if text.is_empty() {
        return 0;
    }

    state.accumulator.push_str(&text);
    state.tokens_emitted += 1;
    if let Some(cb) = state.token_callback.as_ref() {
        cb(&text);
    }

    if state.apply_stop_policy() {
        1
    } else {
        0
    }
}

pub struct GenerateOptions {
    pub max_new_tokens: i32,
    pub stop_sequences: Vec<String>,
    pub is_async: bool,
    pub enable_thinking: bool,
    pub cache_path: Option<String>,
    pub save_cache: bool,
    pub token_callback: Option<Box<dyn Fn(&str) + Send>>,
}

pub struct GenerateOutput {
    pub text: String,
    pub perf: RkllmPerfStat,
    pub used_cached_prefix: bool,
    pub cache_cleared: bool,
    pub finish_reason: FinishReason,
}

impl RkllmEngine {
    pub fn load(model_path: &str, friendly_name: &str, context_len: u32, config: &Config) -> Result<Self> {
        let model_path_c =
            CString::new(model_path).map_err(|e| Error::LoadFailed(e.to_string()))?;

        let mut param = RkllmParam {
            model_path: model_path_c.as_ptr(),
            max_context_len: context_len as i32,
            max_new_tokens: config.model_defaults.max_new_tokens,
            top_k: config.inference_params.top_k,
            n_keep: config.model_defaults.n_keep,
            top_p: config.inference_params.top_p,
            temperature: config.inference_params.temperature,
            repeat_penalty: config.inference_params.repeat_penalty,
            frequency_penalty: config.inference_params.frequency_penalty,
            presence_penalty: config.inference_params.presence_penalty,
            mirostat: config.inference_params.mirostat,
            mirostat_tau: config.inference_params.mirostat_tau,
            mirostat_eta: config.inference_params.mirostat_eta,
            skip_special_token: config.model_defaults.skip_special_token,
            is_async: config.model_defaults.is_async,
            img_start: std::ptr::null(),
            img_end: std::ptr::null(),
            img_content: std::ptr::null(),
            extend_param: RkllmExtendParam {
                base_domain_id: config.hardware.base_domain_id,
                embed_flash: config.hardware.embed_flash as i8,
                enabled_cpus_num: config.hardware.enabled_cpus_num as i8,
                enabled_cpus_mask: config.hardware.enabled_cpus_mask,
                n_batch: config.hardware.n_batch as u8,
                use_cross_attn: config.hardware.use_cross_attn as i8,
                reserved: [0u8; 104],
            },
        };

        let state = Arc::new(Mutex::new(CallbackState::new(0, Vec::new())));
        let mut handle: RkllmHandle = std::ptr::null_mut();

        let ret = unsafe { ffi::rkllm_init(&mut handle, &mut param, generation_trampoline) };
        if ret != 0 {
            return Err(Error::LoadFailed(format!("rkllm_init failed with code {ret}")));
        }

        if !config.chat_template.system_prompt.is_empty()
            || !config.chat_template.user_prefix.is_empty()
        {
            let sys = CString::new(config.chat_template.system_prompt.clone()).unwrap_or_default();
            let prefix = CString::new(config.chat_template.user_prefix.clone()).unwrap_or_default();
            let postfix =
                CString::new(config.chat_template.assistant_prefix.clone()).unwrap_or_default();
            let ret = unsafe {
                ffi::rkllm_set_chat_template(handle, sys.as_ptr(), prefix.as_ptr(), postfix.as_ptr())
            };
            if ret != 0 {
                tracing::warn!(code = ret, "rkllm_set_chat_template returned non-zero, ignoring");
            }
        }

        Ok(Self {
            handle,
            state,
            npu_context: Mutex::new(String::new()),
            model_name: friendly_name.to_string(),
            context_len,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn context_len(&self) -> u32 {
        self.context_len
    }

    /// Runs one blocking generation, applying the smart-prefix KV-cache
    /// heuristic and the binary-cache interplay.
    pub fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<GenerateOutput> {
        let mut npu_context = self.npu_context.lock().unwrap();

        let (input_prompt, used_cached_prefix, cache_cleared) =
            if !npu_context.is_empty() && prompt.starts_with(npu_context.as_str()) {
                let delta = &prompt[npu_context.len()..];
                if delta.is_empty() {
                    self.clear_kv_cache_native()?;
                    npu_context.clear();
                    (prompt, false, true)
                } else {
                    (delta, true, false)
                }
            } else {
                self.clear_kv_cache_native()?;
                npu_context.clear();
                (prompt, false, true)
            };

        let stop_sequences = if options.stop_sequences.is_empty() {
            DEFAULT_STOP_SEQUENCES.iter().map(|s| s.to_string()).collect()
        } else {
            options.stop_sequences
        };

        {
            let mut state = self.state.lock().unwrap();
            *state = CallbackState::new(options.max_new_tokens, stop_sequences);
            state.token_callback = options.token_callback;
        }

        let prompt_c = CString::new(input_prompt)
            .map_err(|e| Error::FfiError(format!("prompt contains NUL byte: {e}")))?;
        let role_c = CString::new("user").unwrap();

        let mut input = RkllmInput {
            role: role_c.as_ptr(),
            enable_thinking: options.enable_thinking,
            input_type: RKLLM_INPUT_PROMPT,
            input_data: RkllmInputUnion {
                prompt_input: prompt_c.as_ptr(),
            },
        };

        let cache_path_c = options
            .cache_path
            .as_ref()
            .map(|p| CString::new(p.as_str()).map_err(|e| Error::CachePathInvalid(e.to_string())))
            .transpose()?;

        let mut prompt_cache_param = cache_path_c.as_ref().map(|path_c| RkllmPromptCacheParam {
            save_prompt_cache: options.save_cache as c_int,
            prompt_cache_path: path_c.as_ptr(),
        });

        let mut infer_params = RkllmInferParam {
            mode: RKLLM_INFER_GENERATE,
            lora_params: std::ptr::null(),
            prompt_cache_params: prompt_cache_param
                .as_mut()
                .map(|p| p as *mut _ as *const c_void)
                .unwrap_or(std::ptr::null()),
            keep_history: 0,
        };

        let userdata = Box::new(CallbackUserdata {
            state: self.state.clone(),
        });
        let userdata_ptr = Box::into_raw(userdata) as *mut c_void;

        let ret = if options.is_async {
            unsafe { ffi::rkllm_run_async(self.handle, &mut input, &mut infer_params, userdata_ptr) }
        } else {
            unsafe { ffi::rkllm_run(self.handle, &mut input, &mut infer_params, userdata_ptr) }
        };

        // Reclaim and drop the userdata box; the trampoline only borrows it
        // synchronously for the duration of the native call in both the
        // sync and (after the poll loop below) async cases.
        let reclaim = |ptr: *mut c_void| unsafe {
            drop(Box::from_raw(ptr as *mut CallbackUserdata));
        };

        if ret != 0 {
            reclaim(userdata_ptr);
            return Err(Error::FfiError(format!("rkllm_run(_async) failed with code {ret}")));
        }

        if options.is_async {
            std::thread::sleep(Duration::from_millis(10));
            while unsafe { ffi::rkllm_is_running(self.handle) } == 1 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        reclaim(userdata_ptr);

        let (text, perf, failed, finish_reason) = {
            let state = self.state.lock().unwrap();
            let failed = matches!(state.terminal, Some(Err(_)));
            (
                state.accumulator.clone(),
                state.perf,
                failed,
                state.finish_reason.unwrap_or(FinishReason::Stop),
            )
        };

        if failed {
            return Err(Error::FfiError("generation callback reported an error".to_string()));
        }

        *npu_context = format!("{prompt}{text}");

        Ok(GenerateOutput {
            text,
            perf,
            used_cached_prefix,
            cache_cleared,
            finish_reason,
        })
    }

    /// Always synchronous, gated by `embeddings_enabled` at the HTTP layer.
    /// Uses the callback registered once at `rkllm_init`; `embedding_mode`
    /// on the shared state tells that callback to read `last_hidden_layer`
    /// instead of accumulating decoded text.
    pub fn embed(&self, text: &str) -> Result<(Vec<f32>, RkllmPerfStat)> {
        {
            let mut state = self.state.lock().unwrap();
            *state = CallbackState::new(0, Vec::new());
            state.embedding_mode = true;
        }

        let role_c = CString::new("user").unwrap();
        let text_c =
            CString::new(text).map_err(|e| Error::FfiError(format!("text contains NUL byte: {e}")))?;

        let mut input = RkllmInput {
            role: role_c.as_ptr(),
            enable_thinking: false,
            input_type: RKLLM_INPUT_PROMPT,
            input_data: RkllmInputUnion {
                prompt_input: text_c.as_ptr(),
            },
        };

        let mut infer_params = RkllmInferParam {
            mode: RKLLM_INFER_GET_LAST_HIDDEN_LAYER,
            lora_params: std::ptr::null(),
            prompt_cache_params: std::ptr::null(),
            keep_history: 0,
        };

        let userdata = Box::new(CallbackUserdata {
            state: self.state.clone(),
        });
        let userdata_ptr = Box::into_raw(userdata) as *mut c_void;

        let ret = unsafe { ffi::rkllm_run(self.handle, &mut input, &mut infer_params, userdata_ptr) };
        unsafe { drop(Box::from_raw(userdata_ptr as *mut CallbackUserdata)) };

        if ret != 0 {
            return Err(Error::FfiError(format!("rkllm_run failed with code {ret}")));
        }

        let state = self.state.lock().unwrap();
        match &state.terminal {
            Some(Ok(())) => {}
            _ => return Err(Error::FfiError("embedding extraction did not finish".to_string())),
        }
        let embedding = state
            .embedding
            .clone()
            .ok_or_else(|| Error::FfiError("no embedding produced".to_string()))?;
        Ok((embedding, state.perf))
    }

    /// Calls the native clear only; does not touch `npu_context`. Callers
    /// already hold the `npu_context` lock and must clear it themselves on
    /// success to avoid relocking a non-reentrant mutex.
    fn clear_kv_cache_native(&self) -> Result<()> {
        let ret = unsafe { ffi::rkllm_clear_kv_cache(self.handle, 0, std::ptr::null(), std::ptr::null()) };
        if ret != 0 {
            tracing::warn!(code = ret, "rkllm_clear_kv_cache returned non-zero");
        }
        Ok(())
    }
}

impl Drop for RkllmEngine {
    fn drop(&mut self) {
        tracing::warn!(model = %self.model_name, "destroying RKLLM handle");
        let ret = unsafe { ffi::rkllm_destroy(self.handle) };
        if ret != 0 {
            tracing::warn!(code = ret, "rkllm_destroy returned non-zero");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_policy_triggers_on_max_tokens() {
        let mut state = CallbackState::new(3, vec![]);
        state.tokens_emitted = 3;
        assert!(state.apply_stop_policy());
    }

    #[test]
    fn test_stop_policy_does_not_trigger_below_max_tokens() {
        let mut state = CallbackState::new(3, vec![]);
        state.tokens_emitted = 2;
        assert!(!state.apply_stop_policy());
    }

    #[test]
    fn test_stop_policy_triggers_on_default_sentinel() {
        let mut state = CallbackState::new(0, vec!["<|im_end|>".to_string()]);
        state.accumulator = "hello<|im_end|>".to_string();
        assert!(state.apply_stop_policy());
    }

    #[test]
    fn test_stop_policy_negative_max_tokens_means_no_cap() {
        let mut state = CallbackState::new(-1, vec![]);
        state.tokens_emitted = 10_000;
        assert!(!state.apply_stop_policy());
    }

    #[test]
    fn test_default_stop_sequences_are_two_sentinels() {
        assert_eq!(DEFAULT_STOP_SEQUENCES, &["<|im_end|>", "<|endoftext|>"]);
    }

    #[test]
    fn test_finish_reason_records_length_on_max_tokens() {
        let mut state = CallbackState::new(1, vec![]);
        state.tokens_emitted = 1;
        assert!(state.apply_stop_policy());
        assert_eq!(state.finish_reason, Some(FinishReason::Length));
    }

    #[test]
    fn test_finish_reason_records_stop_on_sequence_match() {
        let mut state = CallbackState::new(100, vec!["<|im_end|>".to_string()]);
        state.accumulator = "done<|im_end|>".to_string();
        assert!(state.apply_stop_policy());
        assert_eq!(state.finish_reason, Some(FinishReason::Stop));
    }
}
