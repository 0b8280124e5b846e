//! Model listing.

use std::error::Error;
use std::sync::Arc;

use crate::core::client::OpenRouterClient;
use crate::core::config::Config;
use crate::core::credentials::KeyringCredentialStore;

pub async fn list_models(refresh: bool) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let client = OpenRouterClient::with_base_url(
        Arc::new(KeyringCredentialStore::new()),
        config.base_url(),
    );

    let models = client.list_models(refresh).await?;

    if models.is_empty() {
        println!("No text-capable models found.");
        return Ok(());
    }

    println!("{} text-capable models:", models.len());
    println!();
    for model in &models {
        let context = model
            .context_length
            .map(|len| format!("{len} ctx"))
            .unwrap_or_else(|| "unknown ctx".to_string());
        let pricing = model
            .pricing
            .as_ref()
            .map(|p| {
                format!(
                    "${:.2}/M in, ${:.2}/M out",
                    p.prompt_cost_per_million(),
                    p.completion_cost_per_million()
                )
            })
            .unwrap_or_else(|| "pricing unknown".to_string());
        println!("  {:<45} {}  [{} | {}]", model.display_name(), model.id, context, pricing);
    }
    Ok(())
}
