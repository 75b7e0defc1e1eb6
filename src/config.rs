use crate::llm::provider::DEFAULT_AZURE_API_VERSION;
use crate::llm::{LlmSettings, Provider};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "multichat.yaml";

/// Default completion endpoint.
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";

/// Default completion model.
const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory holding session records
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<String>,

    /// Storage backend: `file` or `memory`
    #[arg(long)]
    pub storage: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per record under `data_dir`.
    File,
    /// Process memory; nothing survives a restart.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Session name used when title inference fails.
    pub default_title: String,
    /// Timeout of a single completion request.
    pub request_timeout_secs: u64,
}

impl ChatConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Resolve configuration from `args`, environment, file and defaults.
    ///
    /// Priority: CLI flag > CLI env var > `MULTICHAT_` env > config file >
    /// defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("storage.backend", "file")?
            .set_default("storage.data_dir", "data")?
            .set_default("chat.default_title", crate::session::DEFAULT_TITLE)?
            .set_default("chat.request_timeout_secs", 60)?;

        // An explicit file must exist; the working-directory fallback is optional.
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
        }

        // E.g. MULTICHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("MULTICHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(dir) = cli.data_dir {
            builder = builder.set_override("storage.data_dir", dir)?;
        }
        if let Some(backend) = cli.storage {
            builder = builder.set_override("storage.backend", backend)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// Read completion service settings from the environment.
///
/// `LLM_BASE_URL` and `LLM_MODEL` default to `OpenAI`'s public API with
/// `gpt-3.5-turbo`; the key comes from `LLM_API_KEY` or `OPENAI_API_KEY`.
pub fn load_llm_settings(request_timeout: Duration) -> Result<LlmSettings, String> {
    let base_url = env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());
    if base_url.trim().is_empty() {
        return Err("LLM_BASE_URL cannot be empty".to_string());
    }

    let model = env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
    if model.trim().is_empty() {
        return Err("LLM_MODEL cannot be empty".to_string());
    }

    let api_key = env::var("LLM_API_KEY")
        .or_else(|_| env::var("OPENAI_API_KEY"))
        .ok()
        .filter(|s| !s.trim().is_empty());

    let mut provider = Provider::detect_from_url(&base_url);

    if let Provider::AzureOpenAI { .. } = &provider {
        let deployment_name = env::var("AZURE_DEPLOYMENT_NAME")
            .map_err(|_| "Azure endpoints require AZURE_DEPLOYMENT_NAME".to_string())?;
        let api_version = env::var("AZURE_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string());
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version,
        };
    }

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        request_timeout,
    })
}
