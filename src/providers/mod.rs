pub mod common;
pub mod openrouter;
pub mod placeholder;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::HistorySample;
pub use common::{CreditError, ProviderContext};

/// A provider's balance as captured by one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditInfo {
    /// Display-ready balance, e.g. `$5.20`, `PAYG` or `Error`.
    pub balance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_numeric: Option<f64>,
    pub currency: String,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Credits consumed per hour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<Vec<HistorySample>>,
}

impl CreditInfo {
    pub fn from_error(err: &CreditError) -> Self {
        Self {
            balance: err.balance_label().to_string(),
            balance_numeric: None,
            currency: String::new(),
            last_updated: Utc::now(),
            error: Some(err.to_string()),
            consumption_rate: None,
            historical_data: None,
        }
    }

    /// True when the fetch succeeded.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait::async_trait]
pub trait CreditProvider: Send + Sync {
    /// Stable lowercase id; also the credential-store key.
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    /// Abbreviation used when several providers share the summary line.
    fn short_name(&self) -> &'static str;
    fn icon(&self) -> &'static str;
    /// Read from configuration on every call.
    fn is_enabled(&self) -> bool;
    /// Best-effort check of the stored key. Never mutates state.
    async fn validate_api_key(&self) -> bool;
    /// Fetch and normalize the balance. Failures are reported through
    /// `CreditInfo::error`, never as a panic or an `Err`.
    async fn get_credits(&self) -> CreditInfo;
}

/// All known providers, in registration (display) order.
pub fn default_providers(ctx: &ProviderContext) -> Vec<Arc<dyn CreditProvider>> {
    vec![
        Arc::new(openrouter::OpenRouterProvider::new(ctx.clone())),
        Arc::new(placeholder::PlaceholderProvider::openai(ctx.clone())),
        Arc::new(placeholder::PlaceholderProvider::anthropic(ctx.clone())),
        Arc::new(placeholder::PlaceholderProvider::gemini(ctx.clone())),
    ]
}

pub fn find<'a>(
    providers: &'a [Arc<dyn CreditProvider>],
    id: &str,
) -> Option<&'a Arc<dyn CreditProvider>> {
    providers.iter().find(|p| p.id() == id)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Scriptable provider for scheduler and display tests.
    pub struct FakeProvider {
        pub id: &'static str,
        pub name: &'static str,
        pub short_name: &'static str,
        pub enabled: AtomicBool,
        pub result: Mutex<CreditInfo>,
        pub calls: AtomicUsize,
        pub gate: Option<Arc<Notify>>,
        pub panics: bool,
    }

    impl FakeProvider {
        pub fn new(id: &'static str, name: &'static str, short_name: &'static str) -> Self {
            Self {
                id,
                name,
                short_name,
                enabled: AtomicBool::new(true),
                result: Mutex::new(balance("$1.00")),
                calls: AtomicUsize::new(0),
                gate: None,
                panics: false,
            }
        }

        pub fn returning(self, info: CreditInfo) -> Self {
            *self.result.lock().unwrap() = info;
            self
        }

        pub fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub fn panicking(mut self) -> Self {
            self.panics = true;
            self
        }

        pub fn disabled(self) -> Self {
            self.enabled.store(false, Ordering::SeqCst);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CreditProvider for FakeProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn short_name(&self) -> &'static str {
            self.short_name
        }

        fn icon(&self) -> &'static str {
            "*"
        }

        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }

        async fn validate_api_key(&self) -> bool {
            true
        }

        async fn get_credits(&self) -> CreditInfo {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panics {
                panic!("{} exploded", self.id);
            }
            self.result.lock().unwrap().clone()
        }
    }

    pub fn balance(text: &str) -> CreditInfo {
        CreditInfo {
            balance: text.to_string(),
            balance_numeric: None,
            currency: "$".to_string(),
            last_updated: Utc::now(),
            error: None,
            consumption_rate: None,
            historical_data: None,
        }
    }

    pub fn failure(message: &str) -> CreditInfo {
        CreditInfo {
            error: Some(message.to_string()),
            ..balance("Error")
        }
    }
}
