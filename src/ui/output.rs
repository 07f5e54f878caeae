use crate::name::SymbolName;
use crate::symbol::SymbolFlags;
use crate::table::SymbolState;
use crate::ui::icons::state_icon;
use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().label.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

/// One symbol with its flags and an optional address
pub fn symbol_row(name: &SymbolName, flags: SymbolFlags, address: Option<u64>) {
    let address = match address {
        Some(addr) => format!("{:#018x}", addr),
        None => "-".repeat(18),
    };
    println!(
        "  {} {} {}",
        address.style(theme().address.clone()),
        name.as_str().bold(),
        format!("[{}]", flags).style(theme().label.clone())
    );
}

/// One symbol with its lifecycle state
pub fn state_row(name: &SymbolName, state: Option<SymbolState>) {
    match state {
        Some(state) => println!("  {} {} {}", state_icon(state), name.as_str().bold(), state.style(theme().state(state).clone())),
        None => println!("  {} {} {}", Icons::SEARCH, name.as_str().bold(), "not found".style(theme().error.clone())),
    }
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().label.clone()), value);
}
