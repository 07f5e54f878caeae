pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const SEARCH: &str = "🔍";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const HOURGLASS: &str = "⏳";
    pub const GEAR: &str = "⚙️";
    pub const SLEEP: &str = "💤";
}

use crate::table::SymbolState;

/// Icon for an entry's lifecycle state
pub fn state_icon(state: SymbolState) -> &'static str {
    match state {
        SymbolState::Lazy => Icons::SLEEP,
        SymbolState::Materializing => Icons::GEAR,
        SymbolState::Resolved => Icons::HOURGLASS,
        SymbolState::Ready => Icons::CHECK,
        SymbolState::Failed => Icons::CROSS,
    }
}
