use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::zhipu::Endpoint;
use crate::zhipu::speech::{DEFAULT_VOICE, SavedAudio, SpeechRequest, save_audio};

#[derive(Debug, Args, Clone)]
pub struct SpeakArgs {
    pub text: String,
    /// tongtong, xiaoxiao, xiaomo, xiaobei or xiaoxuan
    #[arg(long, default_value = DEFAULT_VOICE)]
    pub voice: String,
    /// wav or mp3
    #[arg(long, default_value = "wav")]
    pub format: String,
    /// Output file; defaults to speech.<format> in the current directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: SpeakArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("speak");

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(format!("speech.{}", args.format)));
    let request = SpeechRequest {
        text: args.text,
        voice: args.voice,
        format: args.format,
        model: settings.model.clone(),
    };

    if settings.dry_run {
        let envelope = request.envelope().map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::Speech, envelope)]);
        return Ok(());
    }

    let client = settings.client()?;
    let saved = client
        .synthesize(&request)
        .and_then(|audio| save_audio(&out, &audio, &request.voice));
    emit(&settings, saved, render)
}

fn render(saved: &SavedAudio) {
    println!(
        "{} {} ({} bytes, {}, voice {})",
        "saved".green(),
        saved.path.display(),
        saved.size,
        saved.format,
        saved.voice
    );
}
