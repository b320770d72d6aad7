use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use super::common::{format_currency, CreditError, ProviderContext};
use super::{CreditInfo, CreditProvider};
use crate::history::{HistorySample, HistoryStore};
use crate::http::DEFAULT_TIMEOUT;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const REFERER: &str = "https://github.com/opencredits/opencredits";
const TITLE: &str = "OpenCredits";
const CURRENCY: &str = "$";

/// OpenRouter balance via `/credits`, falling back to `/auth/key`.
///
/// Every numeric balance is kept in a 24 hour history that drives the
/// consumption rate.
pub struct OpenRouterProvider {
    ctx: ProviderContext,
    base_url: String,
    timeout: Duration,
    history: Mutex<HistoryStore>,
}

/// Outcome of reading the key-info payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum KeyBalance {
    Amount(f64),
    PayAsYouGo,
}

impl OpenRouterProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            history: Mutex::new(HistoryStore::new()),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn headers(api_key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("Authorization", format!("Bearer {}", api_key)),
            ("Content-Type", "application/json".to_string()),
            ("HTTP-Referer", REFERER.to_string()),
            ("X-Title", TITLE.to_string()),
        ]
    }

    async fn fetch(&self, api_key: &str) -> Result<CreditInfo, CreditError> {
        match self.fetch_totals(api_key).await {
            Ok(Some(remaining)) => {
                tracing::info!(
                    provider = self.id(),
                    "Credits fetched from /credits: {}",
                    format_currency(remaining, CURRENCY)
                );
                return Ok(self.record(KeyBalance::Amount(remaining)));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::info!(
                    provider = self.id(),
                    "OpenRouter /credits call failed ({}), falling back to /auth/key",
                    err
                );
            }
        }

        let response = self
            .ctx
            .transport
            .get(&self.url("auth/key"), &Self::headers(api_key), self.timeout)
            .await?;

        if !response.is_success() {
            tracing::error!(
                provider = self.id(),
                status = response.status,
                "Invalid response from OpenRouter API"
            );
            return Err(CreditError::from_status(response.status));
        }
        if response.status != 200 {
            return Err(CreditError::InvalidResponse);
        }

        let body = response
            .json()
            .map_err(|err| CreditError::Parse(format!("Invalid response body: {}", err)))?;
        let resolved = resolve_key_balance(payload(&body));

        let info = self.record(resolved);
        tracing::info!(provider = self.id(), "Credits fetched successfully: {}", info.balance);
        Ok(info)
    }

    /// `Ok(None)` means "try the key-info endpoint instead".
    async fn fetch_totals(&self, api_key: &str) -> Result<Option<f64>, CreditError> {
        let response = self
            .ctx
            .transport
            .get(&self.url("credits"), &Self::headers(api_key), self.timeout)
            .await?;

        if response.status != 200 {
            tracing::info!(
                provider = self.id(),
                "OpenRouter /credits returned status {}, falling back to /auth/key",
                response.status
            );
            return Ok(None);
        }

        let remaining = response
            .json()
            .ok()
            .and_then(|body| resolve_totals(payload(&body)));
        if remaining.is_none() {
            tracing::info!(
                provider = self.id(),
                "OpenRouter /credits body had no usable totals, falling back to /auth/key"
            );
        }

        Ok(remaining)
    }

    /// Append to history (numeric balances only) and build the result.
    fn record(&self, resolved: KeyBalance) -> CreditInfo {
        let now = Utc::now();
        let window = chrono::Duration::minutes(i64::from(self.ctx.config.consumption_rate_period()));
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        let (balance, balance_numeric, consumption_rate) = match resolved {
            KeyBalance::Amount(amount) => {
                history.append(HistorySample::new(now, amount));
                let rate = history.consumption_rate(window, now);
                (format_currency(amount, CURRENCY), Some(amount), rate)
            }
            KeyBalance::PayAsYouGo => ("PAYG".to_string(), None, None),
        };

        CreditInfo {
            balance,
            balance_numeric,
            currency: CURRENCY.to_string(),
            last_updated: now,
            error: None,
            consumption_rate,
            historical_data: Some(history.snapshot()),
        }
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CreditProvider for OpenRouterProvider {
    fn id(&self) -> &'static str {
        "openrouter"
    }

    fn name(&self) -> &'static str {
        "OpenRouter"
    }

    fn short_name(&self) -> &'static str {
        "OR"
    }

    fn icon(&self) -> &'static str {
        "🌐"
    }

    fn is_enabled(&self) -> bool {
        self.ctx.config.is_provider_enabled(self.id())
    }

    /// Live probe: the key-info endpoint must answer 200 with a JSON body.
    async fn validate_api_key(&self) -> bool {
        let Some(api_key) = self.ctx.api_key(self.id()).await else {
            tracing::warn!(provider = self.id(), "No API key found");
            return false;
        };

        let response = match self
            .ctx
            .transport
            .get(&self.url("auth/key"), &Self::headers(&api_key), self.timeout)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(provider = self.id(), "API key validation error: {}", err);
                return false;
            }
        };

        let has_body = response.json().map(|v| !v.is_null()).unwrap_or(false);
        if response.status == 200 && has_body {
            tracing::info!(provider = self.id(), "API key validation successful");
            true
        } else {
            tracing::warn!(
                provider = self.id(),
                status = response.status,
                "API key validation failed"
            );
            false
        }
    }

    async fn get_credits(&self) -> CreditInfo {
        let Some(api_key) = self.ctx.api_key(self.id()).await else {
            return CreditInfo::from_error(&CreditError::MissingCredential);
        };

        tracing::info!(provider = self.id(), "Fetching credits from OpenRouter");

        match self.fetch(&api_key).await {
            Ok(info) => info,
            Err(err) => {
                tracing::error!(provider = self.id(), "Failed to fetch credits: {}", err);
                CreditInfo::from_error(&err)
            }
        }
    }
}

/// Responses are either `{"data": {...}}` or the bare object.
fn payload(body: &Value) -> &Value {
    match body.get("data") {
        Some(data) if !data.is_null() => data,
        _ => body,
    }
}

/// Numbers or numeric strings, finite only.
fn loose_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn strict_number(value: Option<&Value>) -> Option<f64> {
    value?.as_f64().filter(|n| n.is_finite())
}

/// Remaining credits from the aggregate totals endpoint.
pub(crate) fn resolve_totals(data: &Value) -> Option<f64> {
    let total_credits = loose_number(data.get("total_credits"))?;
    let total_usage = loose_number(data.get("total_usage"))?;
    Some((total_credits - total_usage).max(0.0))
}

/// First match wins: `credit_left`, `balance`, `limit - usage`, else PAYG.
pub(crate) fn resolve_key_balance(data: &Value) -> KeyBalance {
    if let Some(left) = loose_number(data.get("credit_left")) {
        return KeyBalance::Amount(left);
    }
    if let Some(balance) = loose_number(data.get("balance")) {
        return KeyBalance::Amount(balance);
    }
    if let (Some(limit), Some(usage)) = (
        strict_number(data.get("limit")),
        strict_number(data.get("usage")),
    ) {
        return KeyBalance::Amount((limit - usage).max(0.0));
    }
    KeyBalance::PayAsYouGo
}
