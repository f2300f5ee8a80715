use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::zhipu::Endpoint;
use crate::zhipu::tokenizer::{ChatMessage, TokenUsage, tokenizer_request};

#[derive(Debug, Args, Clone)]
pub struct TokensArgs {
    /// Text counted as the last message
    pub text: Option<String>,
    /// Role of the positional text: system, user or assistant
    #[arg(long, default_value = "user")]
    pub role: String,
    /// Earlier conversation message as ROLE=CONTENT; repeatable
    #[arg(long = "message", value_name = "ROLE=CONTENT", value_parser = parse_message)]
    pub messages: Vec<ChatMessage>,
}

fn parse_message(raw: &str) -> Result<ChatMessage, String> {
    let (role, content) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ROLE=CONTENT, got '{raw}'"))?;
    Ok(ChatMessage::new(role.trim(), content))
}

pub fn run(args: TokensArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("tokens");

    let mut messages = args.messages;
    if let Some(text) = args.text {
        messages.push(ChatMessage::new(args.role, text));
    }

    if settings.dry_run {
        let envelope =
            tokenizer_request(&messages, settings.model()).map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::Tokenizer, envelope)]);
        return Ok(());
    }

    let client = settings.client()?;
    emit(&settings, client.tokenize(&messages, settings.model()), render)
}

fn render(usage: &TokenUsage) {
    println!(
        "{} prompt tokens {}",
        usage.prompt_tokens.to_string().bold(),
        format!("({})", usage.model).dimmed()
    );
}
