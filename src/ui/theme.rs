use crate::table::SymbolState;
use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Terminal styles for CLI output. Symbol states each get their own color so
/// a lookup report reads at a glance.
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub label: Style,
    pub address: Style,
    lazy: Style,
    in_flight: Style,
    ready: Style,
    failed: Style,
}

impl Theme {
    /// Colors only when stdout is a terminal and colors are not disabled
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() && console::colors_enabled() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().cyan().bold(),
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warn: Style::new().yellow().bold(),
            info: Style::new().magenta(),
            label: Style::new().white().dimmed(),
            address: Style::new().cyan(),
            lazy: Style::new().bright_black(),
            in_flight: Style::new().yellow(),
            ready: Style::new().green(),
            failed: Style::new().red(),
        }
    }

    pub fn plain() -> Self {
        let none = Style::new();
        Self {
            header: none.clone(),
            success: none.clone(),
            error: none.clone(),
            warn: none.clone(),
            info: none.clone(),
            label: none.clone(),
            address: none.clone(),
            lazy: none.clone(),
            in_flight: none.clone(),
            ready: none.clone(),
            failed: none,
        }
    }

    /// Style for a symbol's lifecycle state
    pub fn state(&self, state: SymbolState) -> &Style {
        match state {
            SymbolState::Lazy => &self.lazy,
            SymbolState::Materializing | SymbolState::Resolved => &self.in_flight,
            SymbolState::Ready => &self.ready,
            SymbolState::Failed => &self.failed,
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
