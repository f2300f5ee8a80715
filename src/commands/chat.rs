use clap::Args;
use owo_colors::OwoColorize;

use crate::commands::{GlobalArgs, Settings, emit, print_dry_run};
use crate::zhipu::Endpoint;
use crate::zhipu::agent::{AgentReply, AgentRequest, Continuity, DEFAULT_FALLBACK_MODEL};

#[derive(Debug, Args, Clone)]
pub struct ChatArgs {
    /// Agent identifier, e.g. general_translation
    pub agent_id: String,
    /// Message text; optional when --file-id is given
    pub message: Option<String>,
    /// Id of a file already uploaded to the provider
    #[arg(long)]
    pub file_id: Option<String>,
    /// Continue an existing agent conversation
    #[arg(long)]
    pub conversation_id: Option<String>,
    /// Chat model used when the agent endpoint fails
    #[arg(long)]
    pub fallback_model: Option<String>,
}

pub fn run(args: ChatArgs, global: &GlobalArgs) -> Result<(), String> {
    let settings = Settings::resolve(global)?;
    settings.log_verbose("chat");

    let request = AgentRequest {
        agent_id: args.agent_id,
        message: args.message.unwrap_or_default(),
        conversation_id: args.conversation_id,
        file_id: args.file_id,
        fallback_model: args
            .fallback_model
            .or_else(|| settings.model.clone())
            .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
    };

    if settings.dry_run {
        let primary = request.primary_envelope().map_err(|err| err.to_string())?;
        let mut calls = vec![(Endpoint::Agent, primary)];
        if let Ok(fallback) = request.fallback_envelope() {
            calls.push((Endpoint::Chat, fallback));
        }
        print_dry_run(&settings, &calls);
        return Ok(());
    }

    let client = settings.client()?;
    emit(&settings, client.agent_chat(&request), render)
}

fn render(reply: &AgentReply) {
    println!("{}", reply.text);
    if let Some(conversation_id) = &reply.conversation_id {
        eprintln!("{} {conversation_id}", "conversation:".dimmed());
    }
    if reply.continuity == Continuity::Dropped {
        eprintln!(
            "{} answered by chat completion, conversation context was not carried over",
            "degraded:".yellow().bold()
        );
        if let Some(reason) = &reply.reason {
            eprintln!("{} {reason}", "reason:".dimmed());
        }
    }
}
