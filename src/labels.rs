//! Localized tray labels
//!
//! Language tables are embedded TOML files (`lang/<code>.toml`). The requested
//! language falls back to English; if neither loads, an empty provider is
//! used whose lookups return the key itself.

use std::collections::HashMap;

pub const PROGRAM_ALREADY_RUNNING: &str = "program_already_running";
pub const SWITCH_TO_DARK_MODE: &str = "switch_to_dark_mode";
pub const SWITCH_TO_LIGHT_MODE: &str = "switch_to_light_mode";
pub const EXIT: &str = "exit";

const REQUIRED_KEYS: &[&str] = &[
    PROGRAM_ALREADY_RUNNING,
    SWITCH_TO_DARK_MODE,
    SWITCH_TO_LIGHT_MODE,
    EXIT,
];

pub const FALLBACK_LANGUAGE: &str = "en";

const LANGUAGES: &[(&str, &str)] = &[
    ("en", include_str!("../lang/en.toml")),
    ("de", include_str!("../lang/de.toml")),
    ("es", include_str!("../lang/es.toml")),
    ("fr", include_str!("../lang/fr.toml")),
    ("ja", include_str!("../lang/ja.toml")),
    ("zh-cn", include_str!("../lang/zh-cn.toml")),
    ("zh-tw", include_str!("../lang/zh-tw.toml")),
];

/// Label loading errors
#[derive(Debug, thiserror::Error)]
pub enum LabelsError {
    #[error("No language table for '{0}'")]
    NotFound(String),
    #[error("Language table '{code}' is malformed: {source}")]
    Parse {
        code: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Language table '{code}' is missing '{key}'")]
    MissingKey { code: String, key: &'static str },
}

/// Label provider
#[derive(Debug, Clone, Default)]
pub struct Labels {
    language: Option<String>,
    strings: HashMap<String, String>,
}

impl Labels {
    /// Load `requested`, falling back to English.
    ///
    /// Errors only when both fail; the error names the requested language.
    pub fn load(requested: &str) -> Result<Self, LabelsError> {
        load_from(LANGUAGES, requested)
    }

    /// Provider with no strings; every lookup returns its key
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get<'a>(&'a self, key: &'a str) -> &'a str {
        self.strings.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

fn load_from(tables: &[(&str, &str)], requested: &str) -> Result<Labels, LabelsError> {
    match parse_language(tables, requested) {
        Ok(labels) => return Ok(labels),
        Err(e) => tracing::warn!("Cannot load language '{}': {}", requested, e),
    }

    if requested != FALLBACK_LANGUAGE {
        match parse_language(tables, FALLBACK_LANGUAGE) {
            Ok(labels) => return Ok(labels),
            Err(e) => tracing::error!("Cannot load fallback language: {}", e),
        }
    }

    Err(LabelsError::NotFound(requested.to_string()))
}

fn parse_language(tables: &[(&str, &str)], code: &str) -> Result<Labels, LabelsError> {
    let (_, source) = tables
        .iter()
        .find(|(c, _)| *c == code)
        .ok_or_else(|| LabelsError::NotFound(code.to_string()))?;

    let strings: HashMap<String, String> =
        toml::from_str(source).map_err(|source| LabelsError::Parse {
            code: code.to_string(),
            source,
        })?;

    if let Some(key) = REQUIRED_KEYS.iter().find(|k| !strings.contains_key(**k)) {
        return Err(LabelsError::MissingKey {
            code: code.to_string(),
            key: *key,
        });
    }

    Ok(Labels {
        language: Some(code.to_string()),
        strings,
    })
}

/// Map a locale name (`de-DE`, `en_US.UTF-8`, `zh-Hant-TW`) to a table code.
///
/// Chinese picks the traditional table for Taiwan, Hong Kong, Macau or an
/// explicit `Hant` script, and the simplified table otherwise.
pub fn normalize_language(raw: &str) -> Option<&'static str> {
    let lowered = raw
        .split('.')
        .next()
        .unwrap_or_default()
        .trim()
        .replace('_', "-")
        .to_ascii_lowercase();
    if lowered.is_empty() {
        return None;
    }

    if lowered == "zh" || lowered.starts_with("zh-") {
        let traditional = lowered
            .split('-')
            .skip(1)
            .any(|part| matches!(part, "tw" | "hk" | "mo" | "hant"));
        return Some(if traditional { "zh-tw" } else { "zh-cn" });
    }

    let primary = lowered.split('-').next().unwrap_or_default();
    LANGUAGES
        .iter()
        .map(|(code, _)| *code)
        .find(|code| *code == primary)
}

/// Language to load: explicit override, then the OS UI locale, then English
pub fn resolve_language(override_lang: Option<&str>) -> &'static str {
    if let Some(code) = override_lang.and_then(normalize_language) {
        return code;
    }
    system_locale()
        .as_deref()
        .and_then(normalize_language)
        .unwrap_or(FALLBACK_LANGUAGE)
}

#[cfg(windows)]
fn system_locale() -> Option<String> {
    use windows::Win32::Globalization::GetUserDefaultLocaleName;

    // LOCALE_NAME_MAX_LENGTH
    let mut buffer = [0u16; 85];
    let len = unsafe { GetUserDefaultLocaleName(&mut buffer) };
    if len <= 1 {
        return None;
    }
    Some(String::from_utf16_lossy(&buffer[..(len - 1) as usize]))
}

#[cfg(not(windows))]
fn system_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty() && value != "C" && value != "POSIX")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_tables_are_complete() {
        for (code, _) in LANGUAGES {
            let labels = parse_language(LANGUAGES, code).unwrap();
            for key in REQUIRED_KEYS {
                assert_ne!(labels.get(key), *key, "{} missing {}", code, key);
            }
        }
    }

    #[test]
    fn test_unknown_language_falls_back_to_english() {
        let labels = Labels::load("xx").unwrap();
        assert_eq!(labels.language(), Some("en"));
        assert_eq!(labels.get(EXIT), "Exit");
    }

    #[test]
    fn test_both_languages_failing_is_error() {
        let tables = &[("en", "exit = ")];
        assert!(load_from(tables, "de").is_err());
        assert!(load_from(tables, "en").is_err());
    }

    #[test]
    fn test_missing_key_rejects_table() {
        let tables = &[("en", "exit = \"Exit\"")];
        assert!(matches!(
            parse_language(tables, "en"),
            Err(LabelsError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_empty_labels_return_key() {
        let labels = Labels::empty();
        assert_eq!(labels.get(SWITCH_TO_DARK_MODE), SWITCH_TO_DARK_MODE);
        assert_eq!(labels.language(), None);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("de-DE"), Some("de"));
        assert_eq!(normalize_language("en_US.UTF-8"), Some("en"));
        assert_eq!(normalize_language("zh-CN"), Some("zh-cn"));
        assert_eq!(normalize_language("zh_TW"), Some("zh-tw"));
        assert_eq!(normalize_language("zh-Hant-HK"), Some("zh-tw"));
        assert_eq!(normalize_language("zh"), Some("zh-cn"));
        assert_eq!(normalize_language("ko-KR"), None);
        assert_eq!(normalize_language(""), None);
    }

    #[test]
    fn test_override_wins() {
        assert_eq!(resolve_language(Some("fr-CA")), "fr");
    }
}
