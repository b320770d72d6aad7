//! Turning a refresh cycle's results into status text.
//!
//! [`summarize`] is pure; the [`DisplaySink`] it feeds is whatever surface
//! the binary is running (terminal view, one-shot console output).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;

use crate::providers::{CreditInfo, CreditProvider};

pub const TOOLTIP_HEADER: &str = "OpenCredits - API Credit Monitor";
pub const TOOLTIP_FOOTER: [&str; 2] = [
    "Press r to refresh credits",
    "Run 'opencredits configure' for settings",
];

/// At most this many providers share the summary line.
const MAX_SUMMARY_ENTRIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySummary {
    pub text: String,
    pub tooltip: String,
    /// No enabled provider produced a usable balance.
    pub all_failed: bool,
}

/// Where status updates are rendered.
pub trait DisplaySink: Send + Sync {
    fn show_loading(&self);
    fn show_error(&self, message: &str);
    fn update_display(&self, summary: &DisplaySummary) -> anyhow::Result<()>;
    fn hide(&self);
}

/// Build the summary line and tooltip for `providers` (already filtered
/// to the enabled ones, in registration order).
pub fn summarize(
    providers: &[Arc<dyn CreditProvider>],
    results: &HashMap<String, CreditInfo>,
) -> DisplaySummary {
    let valid: Vec<(&dyn CreditProvider, &CreditInfo)> = providers
        .iter()
        .filter_map(|p| {
            results
                .get(p.id())
                .filter(|c| c.is_valid())
                .map(|c| (p.as_ref(), c))
        })
        .collect();

    DisplaySummary {
        text: summary_text(providers.len(), &valid),
        tooltip: tooltip(providers, results),
        all_failed: valid.is_empty(),
    }
}

fn summary_text(enabled: usize, valid: &[(&dyn CreditProvider, &CreditInfo)]) -> String {
    match valid {
        [] if enabled == 1 => "Credit Error".to_string(),
        [] => format!("{} Credit Errors", enabled),
        [(provider, credit)] => match format_consumption_rate(credit) {
            Some(rate) => format!("{}: {} ({})", provider.name(), credit.balance, rate),
            None => format!("{}: {}", provider.name(), credit.balance),
        },
        many => many
            .iter()
            .take(MAX_SUMMARY_ENTRIES)
            .map(|(provider, credit)| format!("{}: {}", provider.short_name(), credit.balance))
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

/// `-$0.0042/hr` style suffix; `None` unless the balance is going down.
pub fn format_consumption_rate(credit: &CreditInfo) -> Option<String> {
    let rate = credit.consumption_rate.filter(|r| *r > 0.0)?;
    if rate < 0.01 {
        Some(format!("-{}{:.4}/hr", credit.currency, rate))
    } else {
        Some(format!("-{}{:.2}/hr", credit.currency, rate))
    }
}

fn tooltip(providers: &[Arc<dyn CreditProvider>], results: &HashMap<String, CreditInfo>) -> String {
    let mut lines = vec![TOOLTIP_HEADER.to_string(), String::new()];

    for provider in providers {
        let line = match results.get(provider.id()) {
            Some(credit) => match &credit.error {
                Some(error) => format!("{} {}: Error - {}", provider.icon(), provider.name(), error),
                None => {
                    let updated = credit.last_updated.with_timezone(&Local).format("%H:%M:%S");
                    let mut line = format!(
                        "{} {}: {} ({})",
                        provider.icon(),
                        provider.name(),
                        credit.balance,
                        updated
                    );
                    if let Some(rate) = format_consumption_rate(credit) {
                        line.push(' ');
                        line.push_str(&rate);
                    }
                    line
                }
            },
            None => format!("{} {}: No data", provider.icon(), provider.name()),
        };
        lines.push(line);
    }

    if !providers.is_empty() {
        lines.push(String::new());
        lines.extend(TOOLTIP_FOOTER.iter().map(|s| s.to_string()));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{balance, failure, FakeProvider};

    fn providers(specs: &[(&'static str, &'static str, &'static str)]) -> Vec<Arc<dyn CreditProvider>> {
        specs
            .iter()
            .map(|&(id, name, short)| {
                Arc::new(FakeProvider::new(id, name, short)) as Arc<dyn CreditProvider>
            })
            .collect()
    }

    fn results(entries: &[(&str, CreditInfo)]) -> HashMap<String, CreditInfo> {
        entries
            .iter()
            .map(|(id, info)| (id.to_string(), info.clone()))
            .collect()
    }

    fn with_rate(text: &str, rate: f64) -> CreditInfo {
        CreditInfo {
            consumption_rate: Some(rate),
            ..balance(text)
        }
    }

    #[test]
    fn all_failed_counts_enabled_providers() {
        let providers = providers(&[("a", "Alpha", "A"), ("b", "Beta", "B")]);
        let results = results(&[("a", failure("Invalid API key")), ("b", failure("Request timeout"))]);

        let summary = summarize(&providers, &results);
        assert_eq!(summary.text, "2 Credit Errors");
        assert!(summary.all_failed);
    }

    #[test]
    fn single_failure_is_singular() {
        let providers = providers(&[("a", "Alpha", "A")]);
        let summary = summarize(&providers, &results(&[("a", failure("nope"))]));
        assert_eq!(summary.text, "Credit Error");
    }

    #[test]
    fn missing_results_count_as_errors() {
        let providers = providers(&[("a", "Alpha", "A"), ("b", "Beta", "B"), ("c", "Gamma", "C")]);
        let summary = summarize(&providers, &HashMap::new());
        assert_eq!(summary.text, "3 Credit Errors");
    }

    #[test]
    fn single_valid_uses_full_name() {
        let providers = providers(&[("a", "Alpha", "A")]);
        let summary = summarize(&providers, &results(&[("a", balance("$5.20"))]));
        assert_eq!(summary.text, "Alpha: $5.20");
        assert!(!summary.all_failed);
    }

    #[test]
    fn single_valid_shows_positive_rate() {
        let providers = providers(&[("a", "Alpha", "A")]);

        let summary = summarize(&providers, &results(&[("a", with_rate("$5.20", 0.5))]));
        assert_eq!(summary.text, "Alpha: $5.20 (-$0.50/hr)");

        let summary = summarize(&providers, &results(&[("a", with_rate("$5.20", 0.0042))]));
        assert_eq!(summary.text, "Alpha: $5.20 (-$0.0042/hr)");
    }

    #[test]
    fn non_positive_rate_is_hidden() {
        let providers = providers(&[("a", "Alpha", "A")]);

        for rate in [0.0, -3.0] {
            let summary = summarize(&providers, &results(&[("a", with_rate("$5.20", rate))]));
            assert_eq!(summary.text, "Alpha: $5.20");
        }
    }

    #[test]
    fn two_valid_use_short_names() {
        let providers = providers(&[("a", "Alpha", "A"), ("b", "Beta", "B")]);
        let summary = summarize(
            &providers,
            &results(&[("a", balance("$5.20")), ("b", with_rate("$10.50", 1.0))]),
        );
        assert_eq!(summary.text, "A: $5.20 | B: $10.50");
    }

    #[test]
    fn three_or_more_keep_registration_order() {
        let providers = providers(&[
            ("a", "Alpha", "A"),
            ("b", "Beta", "B"),
            ("c", "Gamma", "C"),
            ("d", "Delta", "D"),
        ]);
        let summary = summarize(
            &providers,
            &results(&[
                ("d", balance("$0.01")),
                ("c", balance("$300.00")),
                ("b", balance("$2.00")),
                ("a", balance("$1.00")),
            ]),
        );
        assert_eq!(summary.text, "A: $1.00 | B: $2.00 | C: $300.00");
    }

    #[test]
    fn failed_provider_only_in_tooltip() {
        let providers = providers(&[("a", "A", "A"), ("b", "B", "B")]);
        let results = results(&[("a", balance("$5.20")), ("b", failure("Invalid API key"))]);

        let summary = summarize(&providers, &results);
        assert_eq!(summary.text, "A: $5.20");
        assert!(summary.tooltip.contains("* B: Error - Invalid API key"));
    }

    #[test]
    fn tooltip_lists_every_provider() {
        let providers = providers(&[("a", "Alpha", "A"), ("b", "Beta", "B"), ("c", "Gamma", "C")]);
        let ok = with_rate("$5.20", 0.25);
        let updated = ok.last_updated.with_timezone(&Local).format("%H:%M:%S").to_string();
        let results = results(&[("a", ok), ("b", failure("Rate limit exceeded"))]);

        let tooltip = summarize(&providers, &results).tooltip;
        let lines: Vec<&str> = tooltip.lines().collect();
        let alpha = format!("* Alpha: $5.20 ({}) -$0.25/hr", updated);

        assert_eq!(
            lines,
            vec![
                TOOLTIP_HEADER,
                "",
                alpha.as_str(),
                "* Beta: Error - Rate limit exceeded",
                "* Gamma: No data",
                "",
                TOOLTIP_FOOTER[0],
                TOOLTIP_FOOTER[1],
            ]
        );
    }

    #[test]
    fn empty_provider_list_has_no_footer() {
        let summary = summarize(&[], &HashMap::new());
        assert_eq!(summary.tooltip, format!("{}\n", TOOLTIP_HEADER));
    }
}
