use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::relay::rank::RankOptions;
use crate::relay::result::RankedDocument;
use crate::zhipu::Endpoint;
use crate::zhipu::embeddings::{Embedded, embedding_request};

#[derive(Debug, Args, Clone)]
pub struct EmbedArgs {
    #[arg(required = true)]
    pub texts: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct SimilarArgs {
    pub query: String,
    #[arg(required = true)]
    pub candidates: Vec<String>,
    /// Keep only the best K candidates
    #[arg(long)]
    pub top_k: Option<usize>,
    /// Drop candidates scoring below this cosine similarity
    #[arg(long)]
    pub threshold: Option<f64>,
}

pub fn run(args: EmbedArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("embed");

    if settings.dry_run {
        let envelope = embedding_request(&args.texts, settings.model()).map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::Embeddings, envelope)]);
        return Ok(());
    }

    let client = settings.client()?;
    emit(&settings, client.embed(&args.texts, settings.model()), render_embedded)
}

pub fn run_similar(args: SimilarArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("similar");

    if settings.dry_run {
        let mut texts = vec![args.query.clone()];
        texts.extend(args.candidates.iter().cloned());
        let envelope = embedding_request(&texts, settings.model()).map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::Embeddings, envelope)]);
        return Ok(());
    }

    let options = RankOptions {
        top_k: args.top_k,
        threshold: args.threshold,
    };
    let client = settings.client()?;
    emit(
        &settings,
        client.similar(&args.query, &args.candidates, settings.model(), options),
        |ranked: &Vec<RankedDocument>| render_ranked(ranked),
    )
}

fn render_embedded(embedded: &Embedded) {
    println!(
        "{} {} vector(s), {} dimensions",
        embedded.model.bold(),
        embedded.vectors.len(),
        embedded.dimensions
    );
    for (index, vector) in embedded.vectors.iter().enumerate() {
        let head: Vec<String> = vector.iter().take(4).map(|x| format!("{x:.4}")).collect();
        println!("[{index}] [{}, ...]", head.join(", "));
    }
}

pub(crate) fn render_ranked(ranked: &[RankedDocument]) {
    if ranked.is_empty() {
        println!("{}", "no documents passed the filters".dimmed());
    }
    for (rank, document) in ranked.iter().enumerate() {
        println!(
            "{}. {} {} (input #{})",
            rank + 1,
            format!("{:.4}", document.score).cyan(),
            document.text,
            document.index
        );
    }
}
