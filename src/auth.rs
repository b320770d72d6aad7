use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use crate::providers::{CreditProvider, ProviderContext};

/// Where each provider hands out API keys.
fn key_page(provider_id: &str) -> Option<&'static str> {
    match provider_id {
        "openrouter" => Some("https://openrouter.ai/keys"),
        "openai" => Some("https://platform.openai.com/api-keys"),
        "anthropic" => Some("https://console.anthropic.com/settings/keys"),
        "gemini" => Some("https://aistudio.google.com/app/apikey"),
        _ => None,
    }
}

/// Read one key from `input`, trimmed.
pub fn read_api_key<R: BufRead>(input: &mut R) -> Result<String> {
    let mut api_key = String::new();
    input
        .read_line(&mut api_key)
        .context("Failed to read API key")?;

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }

    Ok(api_key)
}

/// Prompt for a key, store it and enable the provider. Returns whether the
/// provider accepted the key; a rejected key stays stored.
pub async fn login(provider: &dyn CreditProvider, ctx: &ProviderContext) -> Result<bool> {
    println!("\n🔐 {} Login\n", provider.name());
    if let Some(page) = key_page(provider.id()) {
        println!("You can find your API key at: {}\n", page);
    }

    print!("Enter your {} API key: ", provider.name());
    io::stdout().flush()?;

    let api_key = read_api_key(&mut io::stdin().lock())?;
    store_key(provider, ctx, &api_key).await?;

    println!("\nValidating API key...");
    let valid = provider.validate_api_key().await;
    Ok(valid)
}

pub async fn store_key(
    provider: &dyn CreditProvider,
    ctx: &ProviderContext,
    api_key: &str,
) -> Result<()> {
    ctx.credentials
        .set(provider.id(), api_key)
        .await
        .context("Failed to store API key")?;
    ctx.config
        .set_provider_enabled(provider.id(), true)
        .context("Failed to enable provider")?;

    tracing::info!(provider = provider.id(), "API key stored");
    Ok(())
}

pub async fn logout(provider: &dyn CreditProvider, ctx: &ProviderContext) -> Result<()> {
    ctx.credentials
        .delete(provider.id())
        .await
        .context("Failed to remove API key")?;

    tracing::info!(provider = provider.id(), "API key removed");
    Ok(())
}

/// Label shown by `opencredits list`.
pub fn credential_status(has_key: bool, enabled: bool) -> &'static str {
    match (has_key, enabled) {
        (true, true) => "Configured & Enabled",
        (true, false) => "Configured",
        (false, _) => "Not configured",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::common::testing::{context, CountingTransport};
    use crate::providers::placeholder::PlaceholderProvider;
    use crate::storage::MemoryStore;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn key_is_trimmed() {
        let mut input = Cursor::new("  sk-or-v1-abc \n");
        assert_eq!(read_api_key(&mut input).unwrap(), "sk-or-v1-abc");
    }

    #[test]
    fn blank_key_is_rejected() {
        let mut input = Cursor::new("   \n");
        let err = read_api_key(&mut input).unwrap_err();
        assert_eq!(err.to_string(), "API key cannot be empty");
    }

    #[test]
    fn status_labels() {
        assert_eq!(credential_status(true, true), "Configured & Enabled");
        assert_eq!(credential_status(true, false), "Configured");
        assert_eq!(credential_status(false, true), "Not configured");
    }

    #[tokio::test]
    async fn store_then_logout() {
        let ctx = context(
            MemoryStore::default(),
            Arc::new(CountingTransport::new(200, "{}")),
        );
        ctx.config.set_provider_enabled("gemini", false).unwrap();
        let gemini = PlaceholderProvider::gemini(ctx.clone());

        store_key(&gemini, &ctx, "AIzaSyA-0123456789abcdef").await.unwrap();
        assert!(ctx.config.is_provider_enabled("gemini"));
        assert!(gemini.validate_api_key().await);

        logout(&gemini, &ctx).await.unwrap();
        assert_eq!(ctx.api_key("gemini").await, None);
        // Removing the key leaves the enabled flag alone
        assert!(ctx.config.is_provider_enabled("gemini"));
    }
}
