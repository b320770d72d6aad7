//! One-shot terminal output for `opencredits status`.

use std::sync::{Mutex, PoisonError};

use colored::Colorize;

use super::Surface;
use crate::display::{DisplaySink, DisplaySummary, TOOLTIP_HEADER};

/// Records the last published state; [`ConsoleSink::render`] turns it into
/// printable text once the cycle is over.
#[derive(Default)]
pub struct ConsoleSink {
    surface: Mutex<Surface>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self) -> Surface {
        self.surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, surface: Surface) {
        *self.surface.lock().unwrap_or_else(PoisonError::into_inner) = surface;
    }

    pub fn render(&self) -> String {
        render(&self.surface())
    }
}

impl DisplaySink for ConsoleSink {
    fn show_loading(&self) {
        self.set(Surface::Loading);
    }

    fn show_error(&self, message: &str) {
        self.set(Surface::Error(message.to_string()));
    }

    fn update_display(&self, summary: &DisplaySummary) -> anyhow::Result<()> {
        self.set(Surface::Showing(summary.clone()));
        Ok(())
    }

    fn hide(&self) {
        self.set(Surface::Hidden);
    }
}

pub fn render(surface: &Surface) -> String {
    match surface {
        Surface::Hidden => {
            "Nothing to show. Enable a provider with 'opencredits login <provider>'."
                .dimmed()
                .to_string()
        }
        Surface::Loading => surface.text().yellow().to_string(),
        Surface::Error(_) => format!("{}\n{}", surface.text().red().bold(), surface.tooltip()),
        Surface::Showing(summary) => {
            let headline = if summary.all_failed {
                summary.text.red().bold()
            } else {
                summary.text.green().bold()
            };

            let mut out = format!("{}\n{}", headline, "─".repeat(50));
            for line in summary.tooltip.lines().filter(|l| *l != TOOLTIP_HEADER) {
                out.push('\n');
                if line.contains(": Error - ") {
                    out.push_str(&line.red().to_string());
                } else {
                    out.push_str(line);
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_last_state() {
        let sink = ConsoleSink::new();
        assert_eq!(sink.surface(), Surface::Hidden);

        sink.show_loading();
        assert_eq!(sink.surface(), Surface::Loading);

        sink.show_error("Failed to refresh credits");
        assert_eq!(
            sink.surface(),
            Surface::Error("Failed to refresh credits".into())
        );

        sink.hide();
        assert_eq!(sink.surface(), Surface::Hidden);
    }

    #[test]
    fn renders_summary_without_header() {
        colored::control::set_override(false);

        let summary = DisplaySummary {
            text: "OpenRouter: $5.20".into(),
            tooltip: format!("{}\n\n🌐 OpenRouter: $5.20 (12:00:00)", TOOLTIP_HEADER),
            all_failed: false,
        };
        let sink = ConsoleSink::new();
        sink.update_display(&summary).unwrap();

        let out = sink.render();
        assert!(out.starts_with("OpenRouter: $5.20\n"));
        assert!(out.contains("🌐 OpenRouter: $5.20 (12:00:00)"));
        assert!(!out.contains(TOOLTIP_HEADER));
    }
}
