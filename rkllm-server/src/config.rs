//! Layered configuration: built-in defaults, optional `config.{toml,yaml,...}`
//! file, then `RKLLM__`-prefixed environment variables, in that order.

use std::path::PathBuf;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Default sampling parameters applied when a request does not override them.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceParamsConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub mirostat: i32,
    #[serde(default = "default_mirostat_tau")]
    pub mirostat_tau: f32,
    #[serde(default = "default_mirostat_eta")]
    pub mirostat_eta: f32,
}

impl Default for InferenceParamsConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_p: default_top_p(),
            temperature: default_temperature(),
            repeat_penalty: default_repeat_penalty(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: default_mirostat_tau(),
            mirostat_eta: default_mirostat_eta(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefaultsConfig {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: i32,
    #[serde(default = "default_true")]
    pub skip_special_token: bool,
    #[serde(default)]
    pub n_keep: i32,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub enable_thinking: bool,
}

impl Default for ModelDefaultsConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            skip_special_token: true,
            n_keep: 0,
            is_async: false,
            enable_thinking: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareConfig {
    #[serde(default = "default_n_batch")]
    pub n_batch: usize,
    #[serde(default = "default_enabled_cpus_num")]
    pub enabled_cpus_num: i32,
    #[serde(default = "default_enabled_cpus_mask")]
    pub enabled_cpus_mask: u32,
    #[serde(default = "default_true")]
    pub embed_flash: bool,
    #[serde(default)]
    pub use_cross_attn: bool,
    #[serde(default)]
    pub base_domain_id: i32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            n_batch: default_n_batch(),
            enabled_cpus_num: default_enabled_cpus_num(),
            enabled_cpus_mask: default_enabled_cpus_mask(),
            embed_flash: true,
            use_cross_attn: false,
            base_domain_id: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTemplateConfig {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    #[serde(default = "default_assistant_prefix")]
    pub assistant_prefix: String,
}

impl Default for ChatTemplateConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            user_prefix: default_user_prefix(),
            assistant_prefix: default_assistant_prefix(),
        }
    }
}

/// Root configuration for the inference server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub inference_params: InferenceParamsConfig,
    #[serde(default)]
    pub model_defaults: ModelDefaultsConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub chat_template: ChatTemplateConfig,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub embeddings_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            inference_params: InferenceParamsConfig::default(),
            model_defaults: ModelDefaultsConfig::default(),
            hardware: HardwareConfig::default(),
            chat_template: ChatTemplateConfig::default(),
            models_dir: default_models_dir(),
            cache_dir: default_cache_dir(),
            embeddings_enabled: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_top_k() -> i32 {
    40
}
fn default_top_p() -> f32 {
    0.9
}
fn default_temperature() -> f32 {
    0.8
}
fn default_repeat_penalty() -> f32 {
    1.1
}
fn default_mirostat_tau() -> f32 {
    5.0
}
fn default_mirostat_eta() -> f32 {
    0.1
}
fn default_max_new_tokens() -> i32 {
    1024
}
fn default_n_batch() -> usize {
    3
}
fn default_enabled_cpus_num() -> i32 {
    4
}
fn default_enabled_cpus_mask() -> u32 {
    0xF0
}
fn default_user_prefix() -> String {
    "<|im_start|>user\n".to_string()
}
fn default_assistant_prefix() -> String {
    "<|im_start|>assistant\n".to_string()
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Loads configuration from built-in defaults, an optional `config.toml`
    /// (or any format the `config` crate recognizes), and environment
    /// variables in `RKLLM__SECTION__FIELD` form (e.g.
    /// `RKLLM__HARDWARE__N_BATCH=5`), in that order of precedence.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("api.host", default_host())?
            .set_default("api.port", default_port() as i64)?
            .set_default("inference_params.top_k", default_top_k() as i64)?
            .set_default("inference_params.top_p", default_top_p() as f64)?
            .set_default("inference_params.temperature", default_temperature() as f64)?
            .set_default("inference_params.repeat_penalty", default_repeat_penalty() as f64)?
            .set_default("inference_params.frequency_penalty", 0.0_f64)?
            .set_default("inference_params.presence_penalty", 0.0_f64)?
            .set_default("inference_params.mirostat", 0_i64)?
            .set_default("inference_params.mirostat_tau", default_mirostat_tau() as f64)?
            .set_default("inference_params.mirostat_eta", default_mirostat_eta() as f64)?
            .set_default("model_defaults.max_new_tokens", default_max_new_tokens() as i64)?
            .set_default("model_defaults.skip_special_token", true)?
            .set_default("model_defaults.n_keep", 0_i64)?
            .set_default("model_defaults.is_async", false)?
            .set_default("model_defaults.enable_thinking", false)?
            .set_default("hardware.n_batch", default_n_batch() as i64)?
            .set_default("hardware.enabled_cpus_num", default_enabled_cpus_num() as i64)?
            .set_default("hardware.enabled_cpus_mask", default_enabled_cpus_mask() as i64)?
            .set_default("hardware.embed_flash", true)?
            .set_default("hardware.use_cross_attn", false)?
            .set_default("hardware.base_domain_id", 0_i64)?
            .set_default("chat_template.system_prompt", "")?
            .set_default("chat_template.user_prefix", default_user_prefix())?
            .set_default("chat_template.assistant_prefix", default_assistant_prefix())?
            .set_default("models_dir", default_models_dir().to_string_lossy().to_string())?
            .set_default("cache_dir", default_cache_dir().to_string_lossy().to_string())?
            .set_default("embeddings_enabled", false)?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("RKLLM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
