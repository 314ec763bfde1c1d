//! Helpers shared by the engine and the CLI shell.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod settings;

pub use settings::{SETTINGS_PATH_ENV, SUBSCRIPTION_ID_ENV, SettingsError, expand_home, load_settings, load_settings_from};

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+ ]+)",
        r#"(?i)("authorization"\s*:\s*")([^"]*)"#,
        r#"(?i)("(?:adminPasswordOrKey|symmetricKey|primaryKey|secondaryKey|password)"\s*:\s*(?:\{\s*"value"\s*:\s*)?")([^"]*)"#,
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Covers bearer headers in both `name: value` and JSON form, credential
/// fields of rendered request bodies, and `*_TOKEN=value` style pairs.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for regex in SECRET_PATTERNS.iter() {
        redacted = regex
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}<redacted>")
            })
            .to_string();
    }
    redacted
}
