//! Helpers shared by every provider.

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::http::{HttpTransport, TransportError};
use crate::storage::CredentialStore;

/// Collaborators a provider needs to do its job.
#[derive(Clone)]
pub struct ProviderContext {
    pub credentials: Arc<dyn CredentialStore>,
    pub config: Arc<Config>,
    pub transport: Arc<dyn HttpTransport>,
}

impl ProviderContext {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        config: Arc<Config>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            credentials,
            config,
            transport,
        }
    }

    /// The stored key, or `None` when missing or unreadable.
    pub async fn api_key(&self, provider_id: &str) -> Option<String> {
        match self.credentials.get(provider_id).await {
            Ok(key) => key.filter(|k| !k.trim().is_empty()),
            Err(err) => {
                tracing::warn!(provider = provider_id, "Failed to read API key: {:#}", err);
                None
            }
        }
    }
}

/// Everything that can go wrong while fetching a balance. The `Display`
/// text is what ends up in `CreditInfo::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditError {
    #[error("API key not configured")]
    MissingCredential,
    #[error("Provider not implemented")]
    NotImplemented,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Request timeout")]
    Timeout,
    #[error("Request failed with status code {0}")]
    UnexpectedStatus(u16),
    #[error("Invalid API response")]
    InvalidResponse,
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Internal(String),
    #[error("Unknown error")]
    Unknown,
}

impl CreditError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => CreditError::InvalidApiKey,
            429 => CreditError::RateLimited,
            other => CreditError::UnexpectedStatus(other),
        }
    }

    /// Text shown in place of a balance.
    pub fn balance_label(&self) -> &'static str {
        match self {
            CreditError::MissingCredential => "No API Key",
            CreditError::NotImplemented => "Coming Soon",
            _ => "Error",
        }
    }
}

impl From<TransportError> for CreditError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => CreditError::Timeout,
            TransportError::Request(msg) | TransportError::Body(msg) if msg.is_empty() => {
                CreditError::Unknown
            }
            other => CreditError::Network(other.to_string()),
        }
    }
}

/// `$` + two decimals for dollars, otherwise a grouped number followed by
/// the currency label.
pub fn format_currency(amount: f64, currency: &str) -> String {
    if currency == "USD" || currency == "$" {
        format!("${:.2}", amount)
    } else {
        format!("{} {}", group_digits(amount), currency)
    }
}

/// Thousands separators and at most three fraction digits.
fn group_digits(amount: f64) -> String {
    let fixed = format!("{:.3}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let frac = frac_part.trim_end_matches('0');
    let sign = if amount < 0.0 && (int_part != "0" || !frac.is_empty()) {
        "-"
    } else {
        ""
    };

    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}
