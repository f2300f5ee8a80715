//! CLI subcommands and the settings they share.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{self as profile_config, ProfileConfig};
use crate::error::ZpError;
use crate::record;
use crate::relay::batch::BatchRunner;
use crate::relay::envelope::RequestEnvelope;
use crate::relay::transport::RetryPolicy;
use crate::zhipu::client::{self, ClientConfig, DEFAULT_BASE_URL, Endpoint, ZhipuClient};

pub mod chat;
pub mod config;
pub mod embed;
pub mod image;
pub mod moderate;
pub mod rerank;
pub mod search;
pub mod speak;
pub mod tokens;
pub mod transcribe;
pub mod vision;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Flags accepted by every subcommand.
#[derive(Debug, Args, Clone, Default)]
pub struct GlobalArgs {
    /// Profile name from the config file
    #[arg(long, global = true)]
    pub profile: Option<String>,
    /// Model override for the operation
    #[arg(long, global = true)]
    pub model: Option<String>,
    /// Shorthand for --output json
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long, value_enum, global = true)]
    pub output: Option<OutputMode>,
    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    /// Total attempts per request, including the first
    #[arg(long, global = true)]
    pub attempts: Option<u32>,
    /// Initial retry delay in milliseconds, doubled on every retry
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,
    /// Print endpoint and request body without sending anything
    #[arg(long, global = true)]
    pub dry_run: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
}

/// Effective settings after applying CLI > env > profile > default.
#[derive(Debug, Clone)]
pub struct Settings {
    pub profile: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub attempts: u32,
    pub retry_delay_ms: u64,
    pub output: OutputMode,
    pub batch_delay_ms: u64,
    pub concurrency: usize,
    pub dry_run: bool,
    pub verbose: bool,
}

impl Settings {
    pub fn resolve(args: &GlobalArgs) -> Result<Self, String> {
        let profile = match args.profile.as_deref() {
            Some(name) => profile_config::load_profile(name)?,
            None => ProfileConfig::default(),
        };

        let output = if args.json {
            OutputMode::Json
        } else if let Some(output) = args.output {
            output
        } else {
            match profile.output.as_deref() {
                None | Some("text") => OutputMode::Text,
                Some("json") => OutputMode::Json,
                Some(other) => {
                    return Err(format!(
                        "Invalid output '{other}' in profile. Supported values: text, json."
                    ));
                }
            }
        };

        let attempts = args
            .attempts
            .or(env_parse("ZP_ATTEMPTS")?)
            .or(profile.attempts)
            .unwrap_or(DEFAULT_ATTEMPTS);
        if attempts == 0 {
            return Err("Attempts must be at least 1.".to_string());
        }
        let timeout_secs = args
            .timeout
            .or(env_parse("ZP_TIMEOUT")?)
            .or(profile.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err("Timeout must be at least 1 second.".to_string());
        }

        Ok(Self {
            api_key: client::api_key_from_env().or_else(|| {
                profile
                    .api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
            }),
            base_url: env_string("ZP_BASE_URL")
                .or(profile.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: args
                .model
                .clone()
                .or_else(|| env_string("ZP_MODEL"))
                .or(profile.model.clone()),
            timeout_secs,
            attempts,
            retry_delay_ms: args
                .retry_delay
                .or(env_parse("ZP_RETRY_DELAY")?)
                .or(profile.retry_delay)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            output,
            batch_delay_ms: profile.batch_delay.unwrap_or(0),
            concurrency: profile.concurrency.unwrap_or(1).max(1),
            dry_run: args.dry_run,
            verbose: args.verbose,
            profile: args.profile.clone(),
        })
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn batch_runner(&self) -> BatchRunner {
        BatchRunner::new(Duration::from_millis(self.batch_delay_ms)).with_concurrency(self.concurrency)
    }

    /// Builds the live client. The API key is required here and nowhere else.
    pub fn client(&self) -> Result<ZhipuClient, String> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            ZpError::MissingApiKey {
                key_env: client::API_KEY_ENV,
            }
            .to_string()
        })?;
        ZhipuClient::new(ClientConfig {
            api_key,
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: self.retry_policy(),
        })
        .map_err(|err| err.to_string())
    }

    /// Prints the resolved settings to stderr. The key itself is never shown.
    pub fn log_verbose(&self, command: &str) {
        if !self.verbose {
            return;
        }
        eprintln!(
            "command={command} profile={} base_url={} model={} output={} timeout_secs={} attempts={} retry_delay_ms={} batch_delay_ms={} concurrency={} api_key_present={}",
            self.profile.as_deref().unwrap_or("-"),
            self.base_url,
            self.model.as_deref().unwrap_or("-"),
            self.output.as_str(),
            self.timeout_secs,
            self.attempts,
            self.retry_delay_ms,
            self.batch_delay_ms,
            self.concurrency,
            self.api_key.is_some()
        );
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|err| format!("Invalid {key} '{raw}': {err}.")),
        None => Ok(None),
    }
}

/// Prints what would be sent for each call and returns without any network I/O.
pub fn print_dry_run(settings: &Settings, calls: &[(Endpoint, RequestEnvelope)]) {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(endpoint, envelope)| client::preview(&settings.base_url, envelope, *endpoint))
        .collect();
    let body = json!({
        "dry_run": true,
        "output": settings.output.as_str(),
        "request": {
            "base_url": client::normalize_base_url(&settings.base_url),
            "timeout_secs": settings.timeout_secs,
            "attempts": settings.attempts,
            "retry_delay_ms": settings.retry_delay_ms,
        },
        "calls": calls,
    });
    println!("{body}");
}

/// Emits an operation result in the selected output mode. Failures become a
/// `{"success": false}` record in JSON mode and a non-zero exit either way.
pub fn emit<T, F>(settings: &Settings, result: Result<T, ZpError>, render_text: F) -> Result<(), String>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match settings.output {
        OutputMode::Json => {
            println!("{}", record::from_result(&result));
            result.map(|_| ()).map_err(|err| err.to_string())
        }
        OutputMode::Text => {
            let value = result.map_err(|err| err.to_string())?;
            render_text(&value);
            Ok(())
        }
    }
}
