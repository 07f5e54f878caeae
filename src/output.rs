use serde::Serialize;
use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("LAZYLINK_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json { OutputMode::Json } else { OutputMode::Human }
    }

    pub fn is_human(&self) -> bool {
        *self == OutputMode::Human
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    ok: bool,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Print a JSON success envelope. Human mode prints nothing.
pub fn emit_success<T: Serialize>(mode: OutputMode, command: &str, data: T) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        let envelope = Envelope { ok: true, command, data: Some(data), error: None };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

/// Print a JSON error envelope. Human mode prints nothing.
pub fn emit_error(mode: OutputMode, command: &str, message: &str) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        let envelope: Envelope<'_, ()> = Envelope { ok: false, command, data: None, error: Some(message.to_string()) };
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let envelope = Envelope { ok: true, command: "flags", data: Some(vec![1, 2]), error: None };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["command"], "flags");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_output_mode_from_flag() {
        assert!(OutputMode::from_flag(false).is_human());
        assert!(!OutputMode::from_flag(true).is_human());
    }
}
