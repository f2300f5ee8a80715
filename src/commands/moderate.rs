use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::error::ZpError;
use crate::zhipu::Endpoint;
use crate::zhipu::moderation::{ModerationBatch, ModerationOutcome, moderation_request};

#[derive(Debug, Args, Clone)]
pub struct ModerateArgs {
    /// Texts to check; more than one runs as a batch
    #[arg(required = true)]
    pub texts: Vec<String>,
}

pub fn run(args: ModerateArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("moderate");

    if settings.dry_run {
        let calls = args
            .texts
            .iter()
            .map(|text| moderation_request(text, settings.model()).map(|e| (Endpoint::Moderation, e)))
            .collect::<Result<Vec<_>, ZpError>>()
            .map_err(|err| err.to_string())?;
        print_dry_run(&settings, &calls);
        return Ok(());
    }

    let client = settings.client()?;
    if let [text] = args.texts.as_slice() {
        return emit(&settings, client.moderate(text, settings.model()), render_one);
    }
    let batch = client.moderate_batch(&args.texts, settings.model(), &settings.batch_runner());
    emit(&settings, Ok(batch), render_batch)
}

fn verdict_line(outcome: &ModerationOutcome) -> String {
    if outcome.safe {
        format!("{}", "safe".green())
    } else {
        format!(
            "{} risk={:?} types=[{}]",
            "unsafe".red().bold(),
            outcome.verdict.risk_level,
            outcome.verdict.risk_types.join(", ")
        )
    }
}

fn render_one(outcome: &ModerationOutcome) {
    println!("{}", verdict_line(outcome));
}

fn render_batch(batch: &ModerationBatch) {
    for entry in &batch.report.results {
        match (entry.result(), entry.error()) {
            (Some(outcome), _) => println!("[{}] {} {}", entry.index, verdict_line(outcome), entry.input),
            (None, Some(error)) => println!("[{}] {} {error}", entry.index, "error".red()),
            (None, None) => {}
        }
    }
    println!(
        "total={} successful={} failed={} unsafe={}",
        batch.report.total, batch.report.successful, batch.report.failed, batch.unsafe_count
    );
}
