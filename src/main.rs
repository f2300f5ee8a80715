use std::io;
use std::process;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use tracing_subscriber::EnvFilter;
use zpipe::commands::chat::{self, ChatArgs};
use zpipe::commands::config::{self, ConfigArgs};
use zpipe::commands::embed::{self, EmbedArgs, SimilarArgs};
use zpipe::commands::image::{self, ImageArgs};
use zpipe::commands::moderate::{self, ModerateArgs};
use zpipe::commands::rerank::{self, RerankArgs};
use zpipe::commands::search::{self, SearchArgs};
use zpipe::commands::speak::{self, SpeakArgs};
use zpipe::commands::tokens::{self, TokensArgs};
use zpipe::commands::transcribe::{self, TranscribeArgs};
use zpipe::commands::vision::{self, VisionArgs};
use zpipe::commands::GlobalArgs;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("ZP_GIT_SHA"),
    ", built ",
    env!("ZP_BUILD_TS"),
    ")"
);

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  zpipe chat general_translation \"Translate: good morning\"\n  zpipe moderate \"first text\" \"second text\" --json\n  zpipe similar \"cats\" \"kittens\" \"stock market\" --top-k 1\n  zpipe vision \"What is in this picture?\" --file photo.jpg\n  zpipe image \"a red panda reading a book\" --out-dir images\n  zpipe tokens \"How many tokens is this?\"\n  zpipe config check\n  zpipe completion bash > ~/.local/share/bash-completion/completions/zpipe";

const CHAT_HELP_EXAMPLES: &str = "Examples:\n  zpipe chat general_translation \"Translate: good morning\"\n  zpipe chat my_agent \"and then?\" --conversation-id conv_123\n  zpipe chat my_agent \"hello\" --fallback-model glm-4-flash --dry-run";

#[derive(Debug, Parser)]
#[command(
    name = "zpipe",
    version = VERSION,
    about = "Resilient command-line client for the Zhipu (bigmodel) API",
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(
        about = "Talk to an agent, falling back to chat completion",
        after_help = CHAT_HELP_EXAMPLES
    )]
    Chat(ChatArgs),
    #[command(about = "Check texts for unsafe content")]
    Moderate(ModerateArgs),
    #[command(about = "Compute embedding vectors")]
    Embed(EmbedArgs),
    #[command(about = "Rank candidates by embedding similarity to a query")]
    Similar(SimilarArgs),
    #[command(about = "Rank documents with the provider's rerank model")]
    Rerank(RerankArgs),
    #[command(about = "Search the web")]
    Search(SearchArgs),
    #[command(about = "Ask about images, videos, files and links")]
    Vision(VisionArgs),
    #[command(about = "Transcribe .wav/.mp3 audio")]
    Transcribe(TranscribeArgs),
    #[command(about = "Synthesize speech to an audio file")]
    Speak(SpeakArgs),
    #[command(about = "Generate images")]
    Image(ImageArgs),
    #[command(about = "Count prompt tokens for a message or conversation")]
    Tokens(TokensArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "zpipe", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "zpipe", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "zpipe", &mut io::stdout()),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,zpipe=debug")
    } else {
        EnvFilter::try_from_env("ZP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(verbose)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let global = &cli.global;
    let result = match cli.command {
        Commands::Chat(args) => chat::run(args, global),
        Commands::Moderate(args) => moderate::run(args, global),
        Commands::Embed(args) => embed::run(args, global),
        Commands::Similar(args) => embed::run_similar(args, global),
        Commands::Rerank(args) => rerank::run(args, global),
        Commands::Search(args) => search::run(args, global),
        Commands::Vision(args) => vision::run(args, global),
        Commands::Transcribe(args) => transcribe::run(args, global),
        Commands::Speak(args) => speak::run(args, global),
        Commands::Image(args) => image::run(args, global),
        Commands::Tokens(args) => tokens::run(args, global),
        Commands::Config(args) => config::run(args, global),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
