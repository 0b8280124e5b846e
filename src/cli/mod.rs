//! Command-line interface parsing and dispatch.

pub mod auth;
pub mod characters;
pub mod chat;
pub mod model_list;

use std::error::Error;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dramatis")]
#[command(about = "Chat with AI characters via OpenRouter")]
#[command(
    long_about = "Dramatis is a terminal chat client for conversing with configurable AI \
characters through the OpenRouter gateway. Conversations are streamed and \
persisted locally.\n\n\
Authentication:\n\
  Use 'dramatis auth' to store your OpenRouter API key in the system keyring.\n\n\
Chat commands:\n\
  /regen            Regenerate the last response\n\
  /delete           Delete the current conversation and exit\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Character to chat with (lists available characters when omitted)
    #[arg(short = 'c', long, global = true, value_name = "CHARACTER")]
    pub character: Option<String>,

    /// Resume the character's most recent conversation instead of starting
    /// a new one
    #[arg(long, global = true)]
    pub resume: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store an OpenRouter API key in the system keyring
    Auth,
    /// Remove the stored API key
    Deauth,
    /// List available models
    Models {
        /// Bypass the cached model list
        #[arg(long)]
        refresh: bool,
    },
    /// List and manage characters
    Characters {
        #[command(subcommand)]
        action: Option<CharacterAction>,
    },
    /// Start a chat (default)
    Chat,
}

#[derive(Subcommand)]
pub enum CharacterAction {
    /// List characters
    List,
    /// Add a character
    Add {
        name: String,
        /// System prompt defining the persona
        #[arg(long)]
        prompt: String,
        /// Model for new conversations (defaults to the configured model)
        #[arg(long)]
        model: Option<String>,
    },
    /// Delete a character and all of its conversations
    Delete { name: String },
    /// Change the model used for a character's new conversations
    SetModel { name: String, model: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Auth => auth::run_auth().await,
        Commands::Deauth => auth::run_deauth(),
        Commands::Models { refresh } => model_list::list_models(refresh).await,
        Commands::Characters { action } => {
            characters::run_characters(action.unwrap_or(CharacterAction::List))
        }
        Commands::Chat => chat::run_chat(args.character, args.resume).await,
    }
}
