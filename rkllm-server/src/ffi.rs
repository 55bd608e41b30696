//! Raw bindings to `librkllmrt.so`, the vendor-supplied NPU runtime.
//!
//! Struct layouts mirror `rkllm.h` field-for-field; reordering or resizing
//! any of these breaks ABI compatibility with the native library linked at
//! build time.

use std::os::raw::{c_char, c_float, c_int, c_void};

pub type RkllmHandle = *mut c_void;

pub const LLM_RUN_NORMAL: c_int = 0;
pub const LLM_RUN_WAITING: c_int = 1;
pub const LLM_RUN_FINISH: c_int = 2;
pub const LLM_RUN_ERROR: c_int = 3;

pub const RKLLM_INPUT_PROMPT: c_int = 0;
#[allow(dead_code)]
pub const RKLLM_INPUT_TOKEN: c_int = 1;
#[allow(dead_code)]
pub const RKLLM_INPUT_EMBED: c_int = 2;
#[allow(dead_code)]
pub const RKLLM_INPUT_MULTIMODAL: c_int = 3;

pub const RKLLM_INFER_GENERATE: c_int = 0;
pub const RKLLM_INFER_GET_LAST_HIDDEN_LAYER: c_int = 1;
#[allow(dead_code)]
pub const RKLLM_INFER_GET_LOGITS: c_int = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RkllmExtendParam {
    pub base_domain_id: i32,
    pub embed_flash: i8,
    pub enabled_cpus_num: i8,
    pub enabled_cpus_mask: u32,
    pub n_batch: u8,
    pub use_cross_attn: i8,
    pub reserved: [u8; 104],
}

impl Default for RkllmExtendParam {
    fn default() -> Self {
        Self {
            base_domain_id: 0,
            embed_flash: 0,
            enabled_cpus_num: 0,
            enabled_cpus_mask: 0,
            n_batch: 1,
            use_cross_attn: 0,
            reserved: [0u8; 104],
        }
    }
}

#[repr(C)]
pub struct RkllmParam {
    pub model_path: *const c_char,
    pub max_context_len: i32,
    pub max_new_tokens: i32,
    pub top_k: i32,
    pub n_keep: i32,
    pub top_p: c_float,
    pub temperature: c_float,
    pub repeat_penalty: c_float,
    pub frequency_penalty: c_float,
    pub presence_penalty: c_float,
    pub mirostat: i32,
    pub mirostat_tau: c_float,
    pub mirostat_eta: c_float,
    pub skip_special_token: bool,
    pub is_async: bool,
    pub img_start: *const c_char,
    pub img_end: *const c_char,
    pub img_content: *const c_char,
    pub extend_param: RkllmExtendParam,
}

#[repr(C)]
pub struct RkllmTokenInput {
    pub input_ids: *const i32,
    pub n_tokens: usize,
}

#[repr(C)]
pub union RkllmInputUnion {
    pub prompt_input: *const c_char,
    pub token_input: std::mem::ManuallyDrop<RkllmTokenInput>,
}

#[repr(C)]
pub struct RkllmInput {
    pub role: *const c_char,
    pub enable_thinking: bool,
    pub input_type: c_int,
    pub input_data: RkllmInputUnion,
}

/// MUST match the official layout exactly: `save_prompt_cache` first,
/// `prompt_cache_path` second.
#[repr(C)]
pub struct RkllmPromptCacheParam {
    pub save_prompt_cache: c_int,
    pub prompt_cache_path: *const c_char,
}

#[repr(C)]
pub struct RkllmInferParam {
    pub mode: c_int,
    pub lora_params: *const c_void,
    pub prompt_cache_params: *const c_void,
    pub keep_history: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RkllmPerfStat {
    pub prefill_time_ms: c_float,
    pub prefill_tokens: c_int,
    pub generate_time_ms: c_float,
    pub generate_tokens: c_int,
    pub memory_usage_mb: c_float,
}

#[repr(C)]
pub struct RkllmResultLastHiddenLayer {
    pub hidden_states: *const c_float,
    pub embd_size: c_int,
    pub num_tokens: c_int,
}

#[repr(C)]
pub struct RkllmResultLogits {
    pub logits: *const c_float,
    pub vocab_size: c_int,
    pub num_tokens: c_int,
}

#[repr(C)]
pub struct RkllmResult {
    pub text: *const c_char,
    pub token_id: c_int,
    pub last_hidden_layer: RkllmResultLastHiddenLayer,
    pub logits: RkllmResultLogits,
    pub perf: RkllmPerfStat,
}

pub type RkllmCallback =
    extern "C" fn(result: *const RkllmResult, userdata: *mut c_void, state: c_int) -> c_int;

#[link(name = "rkllmrt")]
extern "C" {
    pub fn rkllm_init(
        handle: *mut RkllmHandle,
        param: *const RkllmParam,
        callback: RkllmCallback,
    ) -> c_int;

    pub fn rkllm_run(
        handle: RkllmHandle,
        input: *const RkllmInput,
        infer_params: *const RkllmInferParam,
        userdata: *mut c_void,
    ) -> c_int;

    pub fn rkllm_run_async(
        handle: RkllmHandle,
        input: *const RkllmInput,
        infer_params: *const RkllmInferParam,
        userdata: *mut c_void,
    ) -> c_int;

    pub fn rkllm_is_running(handle: RkllmHandle) -> c_int;

    pub fn rkllm_clear_kv_cache(
        handle: RkllmHandle,
        keep_system_prompt: c_int,
        start: *const c_int,
        end: *const c_int,
    ) -> c_int;

    pub fn rkllm_set_chat_template(
        handle: RkllmHandle,
        system_prompt: *const c_char,
        prefix: *const c_char,
        postfix: *const c_char,
    ) -> c_int;

    pub fn rkllm_destroy(handle: RkllmHandle) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_extend_param_is_128_bytes() {
        // 4 + 1 + 1 + 4 + 1 + 1 + 104, padded to alignment of 4 = 116 -> 120 with padding.
        // We only assert it is at least as large as the reserved tail plus header,
        // since exact padding depends on the target's struct layout rules.
        assert!(size_of::<RkllmExtendParam>() >= 104 + 4);
    }

    #[test]
    fn test_default_extend_param_single_batch() {
        let p = RkllmExtendParam::default();
        assert_eq!(p.n_batch, 1);
    }

    #[test]
    fn test_run_states_are_distinct() {
        let states = [LLM_RUN_NORMAL, LLM_RUN_WAITING, LLM_RUN_FINISH, LLM_RUN_ERROR];
        for (i, a) in states.iter().enumerate() {
            for (j, b) in states.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
