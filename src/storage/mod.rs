use anyhow::{Context, Result};
use async_trait::async_trait;
use keyring::Entry;

const SERVICE_NAME: &str = "opencredits";

/// Secret storage for provider API keys, keyed by provider id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, provider_id: &str) -> Result<Option<String>>;
    async fn set(&self, provider_id: &str, secret: &str) -> Result<()>;
    async fn delete(&self, provider_id: &str) -> Result<()>;
}

fn entry_name(provider_id: &str) -> String {
    format!("opencredits.{}.apiKey", provider_id)
}

/// Credentials kept in the OS keyring.
pub struct KeyringStore {
    service: &'static str,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME,
        }
    }

    fn entry(&self, provider_id: &str) -> Result<Entry> {
        Entry::new(self.service, &entry_name(provider_id)).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self, provider_id: &str) -> Result<Option<String>> {
        match self.entry(provider_id)?.get_password() {
            Ok(secret) if secret.trim().is_empty() => Ok(None),
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err).context("Failed to retrieve credentials from keyring"),
        }
    }

    async fn set(&self, provider_id: &str, secret: &str) -> Result<()> {
        self.entry(provider_id)?
            .set_password(secret)
            .context("Failed to store credentials in keyring")?;

        tracing::debug!(provider = provider_id, "Stored API key");
        Ok(())
    }

    async fn delete(&self, provider_id: &str) -> Result<()> {
        match self.entry(provider_id)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                tracing::debug!(provider = provider_id, "Deleted API key");
                Ok(())
            }
            Err(err) => Err(err).context("Failed to delete credentials from keyring"),
        }
    }
}

#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-process credential store for tests.
    #[derive(Default)]
    pub struct MemoryStore {
        secrets: Mutex<HashMap<String, String>>,
    }

    impl MemoryStore {
        pub fn with(provider_id: &str, secret: &str) -> Self {
            let store = Self::default();
            store
                .secrets
                .lock()
                .unwrap()
                .insert(provider_id.to_string(), secret.to_string());
            store
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn get(&self, provider_id: &str) -> Result<Option<String>> {
            Ok(self.secrets.lock().unwrap().get(provider_id).cloned())
        }

        async fn set(&self, provider_id: &str, secret: &str) -> Result<()> {
            self.secrets
                .lock()
                .unwrap()
                .insert(provider_id.to_string(), secret.to_string());
            Ok(())
        }

        async fn delete(&self, provider_id: &str) -> Result<()> {
            self.secrets.lock().unwrap().remove(provider_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names_are_scoped_by_provider() {
        assert_eq!(entry_name("openrouter"), "opencredits.openrouter.apiKey");
    }

    #[tokio::test]
    #[ignore = "touches the OS keyring"]
    async fn keyring_roundtrip() {
        let store = KeyringStore::new();
        let id = "opencredits-test-provider";

        let _ = store.delete(id).await;

        // No keyring backend on CI machines
        if store.set(id, "secret-value").await.is_err() {
            return;
        }

        match store.get(id).await {
            Ok(Some(secret)) => assert_eq!(secret, "secret-value"),
            _ => return,
        }

        store.delete(id).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::default();
        assert_eq!(store.get("openai").await.unwrap(), None);

        store.set("openai", "sk-test").await.unwrap();
        assert_eq!(store.get("openai").await.unwrap().as_deref(), Some("sk-test"));

        store.delete("openai").await.unwrap();
        assert_eq!(store.get("openai").await.unwrap(), None);
    }
}
