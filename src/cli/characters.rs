//! Character management: list, add, delete, change model.

use std::error::Error;

use crate::cli::CharacterAction;
use crate::core::config::Config;
use crate::core::seed::{seed_if_empty, DEFAULT_MODEL_ID};
use crate::store::{Character, ChatStore, JsonStore};

/// Model assigned to a new character: explicit flag first, then the
/// configured default, then the built-in default.
fn resolve_new_character_model(explicit: Option<String>, configured: Option<&str>) -> String {
    explicit.unwrap_or_else(|| configured.unwrap_or(DEFAULT_MODEL_ID).to_string())
}

pub fn run_characters(action: CharacterAction) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let mut store = JsonStore::open(config.data_path())?;
    seed_if_empty(&mut store)?;

    match action {
        CharacterAction::List => {
            for character in store.characters() {
                let chats = store.conversations_for(character.id).len();
                println!(
                    "  {:<20} {}  ({} conversation{})",
                    character.name,
                    character.model_id,
                    chats,
                    if chats == 1 { "" } else { "s" }
                );
            }
        }
        CharacterAction::Add {
            name,
            prompt,
            model,
        } => {
            if store.character_by_name(&name).is_some() {
                eprintln!("A character named '{name}' already exists.");
                std::process::exit(1);
            }
            let model = resolve_new_character_model(model, config.default_model.as_deref());
            store.insert_character(Character::new(&name, prompt, &model))?;
            println!("Added '{name}' using {model}.");
        }
        CharacterAction::Delete { name } => {
            let character = store
                .character_by_name(&name)
                .ok_or_else(|| format!("No character named '{name}'."))?;
            let chats = store.conversations_for(character.id).len();
            store.delete_character(character.id)?;
            println!(
                "Deleted '{}' and {} conversation{}.",
                character.name,
                chats,
                if chats == 1 { "" } else { "s" }
            );
        }
        CharacterAction::SetModel { name, model } => {
            let mut character = store
                .character_by_name(&name)
                .ok_or_else(|| format!("No character named '{name}'."))?;
            character.model_id = model.clone();
            store.update_character(character)?;
            println!(
                "'{name}' now uses {model} for new conversations. \
Existing conversations keep their snapshotted model."
            );
        }
    }
    Ok(())
}
