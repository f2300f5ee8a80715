use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::zhipu::Endpoint;
use crate::zhipu::vision::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, VisionReply, VisionRequest};

#[derive(Debug, Args, Clone)]
pub struct VisionArgs {
    /// Question or instruction about the media
    #[arg(default_value = "")]
    pub text: String,
    /// Local image, video or document; repeatable
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,
    /// Remote media or page URL; repeatable
    #[arg(long = "url")]
    pub urls: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,
}

pub fn run(args: VisionArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("vision");

    let request = VisionRequest {
        text: args.text,
        files: args.files,
        urls: args.urls,
        model: settings.model.clone(),
        temperature: args.temperature,
        max_tokens: args.max_tokens,
    };

    if settings.dry_run {
        let envelope = request.envelope().map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::Chat, envelope)]);
        return Ok(());
    }

    let client = settings.client()?;
    emit(&settings, client.analyze(&request), render)
}

fn render(reply: &VisionReply) {
    println!("{}", reply.text);
    eprintln!(
        "{} model={} parts={}",
        "vision:".dimmed(),
        reply.model,
        reply.parts
    );
}
