use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};

use crate::hands::BrowserSettings;

const DEFAULT_USER_DATA_URL: &str = "https://my-json-server.typicode.com/naga361111/ApplyAgent/user";

pub const DEFAULT_MODAL_SELECTOR: &str = "#paperApplyModal";

/// Id of the page control that starts the automation; never clicked by it.
pub const DEFAULT_TRIGGER_ID: &str = "runAgentBtn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentBackend {
    Gemini,
    Ollama,
    Openai,
}

/// Server configuration. Every flag can also come from the environment
/// (a `.env` file is loaded before parsing).
#[derive(Debug, Clone, Parser)]
#[command(name = "apply-agent", version, about = "Form-filling browser agent API server")]
pub struct Config {
    #[arg(long, env = "APPLY_AGENT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// First port to try; the next nine are tried if it is taken.
    #[arg(long, env = "APPLY_AGENT_PORT", default_value_t = 8888)]
    pub port: u16,

    /// Endpoint returning a JSON array of user records; the first is used.
    #[arg(long, env = "USER_DATA_URL", default_value = DEFAULT_USER_DATA_URL)]
    pub user_data_url: String,

    #[arg(long = "agent", env = "AGENT_BACKEND", value_enum, default_value_t = AgentBackend::Gemini)]
    pub agent_backend: AgentBackend,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub gemini_model: String,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = "https://generativelanguage.googleapis.com")]
    pub gemini_base_url: String,

    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.1:8b-instruct-q8_0")]
    pub ollama_model: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Transport timeout for one agent call.
    #[arg(long, env = "AGENT_TIMEOUT_SECS", default_value_t = 120)]
    pub agent_timeout_secs: u64,

    #[arg(long, env = "HEADLESS", default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,

    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Chrome user-data directory. Defaults to a profile under the local data dir.
    #[arg(long, env = "CHROME_PROFILE_DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Leave each run's tab open after the run finishes.
    #[arg(long, env = "KEEP_PAGES_OPEN")]
    pub keep_pages_open: bool,

    #[arg(long, env = "MODAL_SELECTOR", default_value = DEFAULT_MODAL_SELECTOR)]
    pub modal_selector: String,

    #[arg(long, env = "TRIGGER_ID", default_value = DEFAULT_TRIGGER_ID)]
    pub trigger_id: String,

    /// How long to wait for a dialog to appear after a click.
    #[arg(long, env = "MODAL_TIMEOUT_MS", default_value_t = 5000)]
    pub modal_timeout_ms: u64,

    /// Deepest chain of nested dialogs a run may open.
    #[arg(long, env = "MAX_DEPTH", default_value_t = 8, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_depth: u64,

    /// Pause after each click so the page can react.
    #[arg(long, env = "SETTLE_MS", default_value_t = 500)]
    pub settle_ms: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        match self.agent_backend {
            AgentBackend::Gemini if self.gemini_api_key.is_none() => {
                bail!("GEMINI_API_KEY not set (required by the gemini agent backend)")
            }
            AgentBackend::Openai if self.openai_api_key.is_none() => {
                bail!("OPENAI_API_KEY not set (required by the openai agent backend)")
            }
            _ => Ok(()),
        }
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            modal_selector: self.modal_selector.clone(),
            trigger_id: self.trigger_id.clone(),
            modal_timeout: Duration::from_millis(self.modal_timeout_ms),
            max_depth: usize::try_from(self.max_depth).unwrap_or(usize::MAX),
            keep_pages_open: self.keep_pages_open,
        }
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        let profile_dir = self.profile_dir.clone().or_else(|| {
            dirs::data_local_dir().map(|dir| dir.join("apply-agent").join("chrome-profile"))
        });
        BrowserSettings {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            profile_dir,
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}

/// The part of the configuration each run consults.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub modal_selector: String,
    pub trigger_id: String,
    pub modal_timeout: Duration,
    pub max_depth: usize,
    pub keep_pages_open: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            modal_selector: DEFAULT_MODAL_SELECTOR.to_string(),
            trigger_id: DEFAULT_TRIGGER_ID.to_string(),
            modal_timeout: Duration::from_millis(5000),
            max_depth: 8,
            keep_pages_open: false,
        }
    }
}
