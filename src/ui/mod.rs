pub mod console;
pub mod watch;

use crate::display::DisplaySummary;

pub const LOADING_TEXT: &str = "Loading Credits...";
pub const ERROR_TEXT: &str = "Credits Error";

/// What a status surface is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Surface {
    #[default]
    Hidden,
    Loading,
    Error(String),
    Showing(DisplaySummary),
}

impl Surface {
    pub fn is_visible(&self) -> bool {
        !matches!(self, Surface::Hidden)
    }

    pub fn text(&self) -> &str {
        match self {
            Surface::Hidden => "",
            Surface::Loading => LOADING_TEXT,
            Surface::Error(_) => ERROR_TEXT,
            Surface::Showing(summary) => &summary.text,
        }
    }

    pub fn tooltip(&self) -> String {
        match self {
            Surface::Hidden | Surface::Loading => String::new(),
            Surface::Error(message) => format!("OpenCredits Error: {}", message),
            Surface::Showing(summary) => summary.tooltip.clone(),
        }
    }
}
