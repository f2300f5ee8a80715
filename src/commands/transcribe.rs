use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::error::ZpError;
use crate::relay::batch::BatchReport;
use crate::zhipu::Endpoint;
use crate::zhipu::transcription::{Transcribed, TranscriptionRequest};

#[derive(Debug, Args, Clone)]
pub struct TranscribeArgs {
    /// .wav or .mp3 files, at most 25 MB each; more than one runs as a batch
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Spoken language hint, e.g. zh or en
    #[arg(long)]
    pub language: Option<String>,
    /// json, text, srt, verbose_json or vtt
    #[arg(long, default_value = "json")]
    pub format: String,
    #[arg(long)]
    pub prompt: Option<String>,
}

pub fn run(args: TranscribeArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("transcribe");

    let template = TranscriptionRequest {
        model: settings.model.clone(),
        language: args.language,
        prompt: args.prompt,
        response_format: args.format,
        ..TranscriptionRequest::new(PathBuf::new())
    };

    if settings.dry_run {
        let calls = args
            .files
            .iter()
            .map(|file| {
                TranscriptionRequest {
                    file: file.clone(),
                    ..template.clone()
                }
                .envelope()
                .map(|envelope| (Endpoint::Transcription, envelope))
            })
            .collect::<Result<Vec<_>, ZpError>>()
            .map_err(|err| err.to_string())?;
        print_dry_run(&settings, &calls);
        return Ok(());
    }

    let client = settings.client()?;
    if let [file] = args.files.as_slice() {
        let request = TranscriptionRequest {
            file: file.clone(),
            ..template
        };
        return emit(&settings, client.transcribe(&request), render_one);
    }
    let report = client.transcribe_batch(&args.files, &template, &settings.batch_runner());
    emit(&settings, Ok(report), render_batch)
}

fn render_one(transcribed: &Transcribed) {
    println!("{}", transcribed.text);
    for segment in &transcribed.segments {
        eprintln!(
            "{} {}",
            format!("[{:>7.2}-{:>7.2}]", segment.start, segment.end).dimmed(),
            segment.text
        );
    }
}

fn render_batch(report: &BatchReport<PathBuf, Transcribed>) {
    for entry in &report.results {
        let name = entry.input.display();
        match (entry.result(), entry.error()) {
            (Some(transcribed), _) => println!("{} {}", format!("{name}:").bold(), transcribed.text),
            (None, Some(error)) => println!("{} {} {error}", format!("{name}:").bold(), "error".red()),
            (None, None) => {}
        }
    }
    println!(
        "total={} successful={} failed={}",
        report.total, report.successful, report.failed
    );
}
