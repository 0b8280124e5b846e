//! Interactive chat loop.
//!
//! The loop alternates between reading a line from stdin and draining the
//! session's stream events, printing fragments as they arrive. Input is not
//! accepted while a response is being generated.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::core::chat_stream::StreamMessage;
use crate::core::client::OpenRouterClient;
use crate::core::config::Config;
use crate::core::credentials::{CredentialStore, KeyringCredentialStore};
use crate::core::seed::seed_if_empty;
use crate::core::session::{ChatSession, SessionError};
use crate::store::{ChatStore, JsonStore, MessageRole};

pub async fn run_chat(character_name: Option<String>, resume: bool) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;

    let credentials: Arc<dyn CredentialStore> = Arc::new(KeyringCredentialStore::new());
    if !credentials.exists() {
        eprintln!("No API key configured. Run 'dramatis auth' first.");
        std::process::exit(1);
    }

    let mut store = JsonStore::open(config.data_path())?;
    seed_if_empty(&mut store)?;

    let Some(name) = character_name else {
        println!("Available characters:");
        for character in store.characters() {
            println!("  {}  ({})", character.name, character.model_id);
        }
        println!();
        println!("Start a chat with: dramatis chat -c <character>");
        return Ok(());
    };

    let character = store
        .character_by_name(&name)
        .ok_or_else(|| format!("No character named '{name}'. Run 'dramatis chat' to list them."))?;

    let client = Arc::new(OpenRouterClient::with_base_url(
        credentials,
        config.base_url(),
    ));
    let (mut session, mut rx) = ChatSession::new(store, client);

    // --resume picks up the most recently updated conversation; otherwise
    // (or when there is none yet) a fresh one is started.
    let previous = if resume {
        session
            .store()
            .conversations_for(character.id)
            .into_iter()
            .next()
    } else {
        None
    };
    match previous {
        Some(conversation) => {
            session.open_conversation(conversation.id)?;
            println!(
                "Resuming '{}' with {} ({}).",
                conversation.title, character.name, conversation.model_id
            );
            for message in session.display_messages() {
                match message.role {
                    MessageRole::User => println!("> {}", message.content),
                    MessageRole::Assistant => println!("{}\n", message.content),
                    MessageRole::System => {}
                }
            }
        }
        None => {
            session.start_conversation(character.id)?;
            println!(
                "Chatting with {} ({}).",
                character.name, character.model_id
            );
        }
    }
    println!("/regen regenerates, /delete removes this conversation, /quit exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        let outcome = match input {
            "" => continue,
            "/quit" => break,
            "/delete" => {
                if let Some(conversation) = session.current_conversation() {
                    session.delete_conversation(conversation.id)?;
                    println!("Conversation deleted.");
                }
                break;
            }
            "/regen" => session.regenerate(),
            text => session.send_message(text),
        };

        match outcome {
            Ok(()) => drain_response(&mut session, &mut rx).await?,
            Err(SessionError::NotRegenerable) => {
                eprintln!("Nothing to regenerate yet.");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// Pump stream events into the session until the in-flight completion ends,
/// echoing fragments as they arrive.
async fn drain_response(
    session: &mut ChatSession<JsonStore>,
    rx: &mut mpsc::UnboundedReceiver<(StreamMessage, u64)>,
) -> Result<(), Box<dyn Error>> {
    while session.is_generating() {
        let Some(event) = rx.recv().await else {
            break;
        };
        if let (StreamMessage::Chunk(fragment), _) = &event {
            print!("{fragment}");
            io::stdout().flush()?;
        }
        session.handle_stream_event(event)?;
    }

    match session.last_error() {
        Some(error) => eprintln!("\n{error}"),
        None => println!(),
    }
    Ok(())
}
