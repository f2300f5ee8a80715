use clap::Args;

use crate::commands::embed::render_ranked;
use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::relay::rank::RankOptions;
use crate::relay::result::RankedDocument;
use crate::zhipu::Endpoint;
use crate::zhipu::rerank::rerank_request;

#[derive(Debug, Args, Clone)]
pub struct RerankArgs {
    pub query: String,
    #[arg(required = true)]
    pub documents: Vec<String>,
    #[arg(long)]
    pub top_k: Option<usize>,
    /// Drop documents whose relevance score is below this value
    #[arg(long)]
    pub threshold: Option<f64>,
}

pub fn run(args: RerankArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("rerank");

    if settings.dry_run {
        let envelope = rerank_request(&args.query, &args.documents, settings.model())
            .map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::Rerank, envelope)]);
        return Ok(());
    }

    let options = RankOptions {
        top_k: args.top_k,
        threshold: args.threshold,
    };
    let client = settings.client()?;
    emit(
        &settings,
        client.rerank(&args.query, &args.documents, settings.model(), options),
        |ranked: &Vec<RankedDocument>| render_ranked(ranked),
    )
}
