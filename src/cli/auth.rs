//! Key setup and removal.

use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use crate::core::client::OpenRouterClient;
use crate::core::config::Config;
use crate::core::credentials::{CredentialStore, KeyringCredentialStore};

pub async fn run_auth() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;

    print!("OpenRouter API key: ");
    io::stdout().flush()?;
    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim();

    if key.is_empty() {
        eprintln!("No key entered.");
        std::process::exit(1);
    }

    // Validate against the live endpoint before persisting anything.
    let credentials: Arc<dyn CredentialStore> = Arc::new(KeyringCredentialStore::new());
    let client = OpenRouterClient::with_base_url(credentials.clone(), config.base_url());
    if !client.validate_key(key).await {
        eprintln!("That key was rejected by OpenRouter. Nothing was saved.");
        std::process::exit(1);
    }

    credentials.save(key)?;
    println!("API key validated and stored in the system keyring.");
    Ok(())
}

pub fn run_deauth() -> Result<(), Box<dyn Error>> {
    let credentials = KeyringCredentialStore::new();
    if !credentials.exists() {
        println!("No API key is stored.");
        return Ok(());
    }
    credentials.delete()?;
    println!("API key removed from the system keyring.");
    Ok(())
}
