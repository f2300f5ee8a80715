use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::zhipu::Endpoint;
use crate::zhipu::web_search::{DEFAULT_COUNT, SearchOutcome, SearchRequest};

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    pub query: String,
    /// Number of results, 1-50
    #[arg(long, default_value_t = DEFAULT_COUNT)]
    pub count: u32,
    /// noLimit, day, week, month or year
    #[arg(long, default_value = "noLimit")]
    pub recency: String,
    /// Ask for search intent analysis
    #[arg(long)]
    pub intent: bool,
}

pub fn run(args: SearchArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("search");

    let request = SearchRequest {
        query: args.query,
        count: args.count,
        recency: args.recency,
        intent: args.intent,
    };

    if settings.dry_run {
        let envelope = request.envelope().map_err(|err| err.to_string())?;
        print_dry_run(&settings, &[(Endpoint::WebSearch, envelope)]);
        return Ok(());
    }

    let client = settings.client()?;
    emit(&settings, client.web_search(&request), render)
}

fn render(outcome: &SearchOutcome) {
    println!("{} result(s) for {}", outcome.total, outcome.query.bold());
    for (index, hit) in outcome.hits.iter().enumerate() {
        println!("\n{}. {}", index + 1, hit.title.bold());
        if !hit.link.is_empty() {
            println!("   {}", hit.link.blue());
        }
        if let Some(date) = &hit.publish_date {
            println!("   {}", date.dimmed());
        }
        println!("   {}", hit.content);
    }
}
