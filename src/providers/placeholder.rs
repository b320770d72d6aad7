//! Providers without a live balance integration yet.
//!
//! OpenAI, Anthropic and Gemini expose no usable balance endpoint for
//! regular API keys, so these report `Coming Soon`. Key validation here is
//! only a local shape check (prefix and length); it does not prove the key
//! works.

use super::common::{CreditError, ProviderContext};
use super::{CreditInfo, CreditProvider};

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    id: &'static str,
    name: &'static str,
    short_name: &'static str,
    icon: &'static str,
    key_prefix: Option<&'static str>,
    min_key_len: usize,
}

const OPENAI: Descriptor = Descriptor {
    id: "openai",
    name: "OpenAI",
    short_name: "OA",
    icon: "🧠",
    key_prefix: Some("sk-"),
    min_key_len: 0,
};

const ANTHROPIC: Descriptor = Descriptor {
    id: "anthropic",
    name: "Anthropic",
    short_name: "AN",
    icon: "🤖",
    key_prefix: Some("sk-ant-"),
    min_key_len: 0,
};

const GEMINI: Descriptor = Descriptor {
    id: "gemini",
    name: "Gemini",
    short_name: "GM",
    icon: "⭐",
    key_prefix: None,
    min_key_len: 20,
};

pub struct PlaceholderProvider {
    ctx: ProviderContext,
    descriptor: Descriptor,
}

impl PlaceholderProvider {
    pub fn openai(ctx: ProviderContext) -> Self {
        Self::with_descriptor(ctx, OPENAI)
    }

    pub fn anthropic(ctx: ProviderContext) -> Self {
        Self::with_descriptor(ctx, ANTHROPIC)
    }

    pub fn gemini(ctx: ProviderContext) -> Self {
        Self::with_descriptor(ctx, GEMINI)
    }

    fn with_descriptor(ctx: ProviderContext, descriptor: Descriptor) -> Self {
        Self { ctx, descriptor }
    }

    fn key_looks_valid(&self, key: &str) -> bool {
        let prefix_ok = self
            .descriptor
            .key_prefix
            .map_or(true, |prefix| key.starts_with(prefix));
        prefix_ok && key.len() >= self.descriptor.min_key_len
    }
}

#[async_trait::async_trait]
impl CreditProvider for PlaceholderProvider {
    fn id(&self) -> &'static str {
        self.descriptor.id
    }

    fn name(&self) -> &'static str {
        self.descriptor.name
    }

    fn short_name(&self) -> &'static str {
        self.descriptor.short_name
    }

    fn icon(&self) -> &'static str {
        self.descriptor.icon
    }

    fn is_enabled(&self) -> bool {
        self.ctx.config.is_provider_enabled(self.id())
    }

    /// Format check only; no request is made.
    async fn validate_api_key(&self) -> bool {
        let Some(key) = self.ctx.api_key(self.id()).await else {
            tracing::warn!(provider = self.id(), "No API key found");
            return false;
        };

        if self.key_looks_valid(&key) {
            tracing::info!(provider = self.id(), "API key format validation successful");
            true
        } else {
            tracing::warn!(provider = self.id(), "Invalid API key format");
            false
        }
    }

    async fn get_credits(&self) -> CreditInfo {
        if self.ctx.api_key(self.id()).await.is_none() {
            return CreditInfo::from_error(&CreditError::MissingCredential);
        }

        tracing::info!(
            provider = self.id(),
            "{} provider not fully implemented yet",
            self.name()
        );
        CreditInfo::from_error(&CreditError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::common::testing::{context, CountingTransport};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn build(
        make: fn(ProviderContext) -> PlaceholderProvider,
        store: MemoryStore,
    ) -> (PlaceholderProvider, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport::new(200, "{}"));
        (make(context(store, transport.clone())), transport)
    }

    #[tokio::test]
    async fn openai_key_prefix() {
        let (good, _) = build(PlaceholderProvider::openai, MemoryStore::with("openai", "sk-abc"));
        assert!(good.validate_api_key().await);

        let (bad, _) = build(PlaceholderProvider::openai, MemoryStore::with("openai", "abc"));
        assert!(!bad.validate_api_key().await);
    }

    #[tokio::test]
    async fn anthropic_key_prefix() {
        let (good, _) = build(
            PlaceholderProvider::anthropic,
            MemoryStore::with("anthropic", "sk-ant-api03-xyz"),
        );
        assert!(good.validate_api_key().await);

        let (bad, _) = build(
            PlaceholderProvider::anthropic,
            MemoryStore::with("anthropic", "sk-proj-xyz"),
        );
        assert!(!bad.validate_api_key().await);
    }

    #[tokio::test]
    async fn gemini_key_length() {
        let (good, transport) = build(
            PlaceholderProvider::gemini,
            MemoryStore::with("gemini", "AIzaSyA-0123456789abcdef"),
        );
        assert!(good.validate_api_key().await);
        assert_eq!(transport.calls(), 0);

        let (bad, _) = build(PlaceholderProvider::gemini, MemoryStore::with("gemini", "short"));
        assert!(!bad.validate_api_key().await);
    }

    #[tokio::test]
    async fn missing_key() {
        let (provider, transport) = build(PlaceholderProvider::anthropic, MemoryStore::default());

        assert!(!provider.validate_api_key().await);

        let info = provider.get_credits().await;
        assert_eq!(info.balance, "No API Key");
        assert_eq!(info.error.as_deref(), Some("API key not configured"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn configured_key_reports_coming_soon() {
        let (provider, transport) =
            build(PlaceholderProvider::openai, MemoryStore::with("openai", "sk-abc"));

        let info = provider.get_credits().await;
        assert_eq!(info.balance, "Coming Soon");
        assert_eq!(info.error.as_deref(), Some("Provider not implemented"));
        assert_eq!(transport.calls(), 0);
    }
}
