//! Structured-document decoding.

use std::path::Path;

use tmplhub_domain::document::Document;

use crate::error::SourceError;

/// Decode blueprint text according to the extension of `path`.
///
/// # Errors
///
/// Returns [`SourceError::UnsupportedFormat`] for anything but `.toml` and
/// `.json`, or the decoder's error.
pub fn decode(path: &str, text: &str) -> Result<Document, SourceError> {
    let value: serde_json::Value = match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(text).map_err(|source| SourceError::Toml {
            path: path.to_string(),
            source,
        })?,
        Some("json") => serde_json::from_str(text).map_err(|source| SourceError::Json {
            path: path.to_string(),
            source,
        })?,
        _ => return Err(SourceError::UnsupportedFormat(path.to_string())),
    };
    Ok(Document::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_input_tag_from_toml() {
        let document = decode("a.toml", "[sensor]\nstate = { \"!input\" = \"text\" }\n").unwrap();
        assert_eq!(
            document.get("sensor").and_then(|sensor| sensor.get("state")),
            Some(&Document::Placeholder("text".to_string()))
        );
    }

    #[test]
    fn should_keep_key_order_from_toml() {
        let document = decode("a.toml", "zeta = 1\nalpha = 2\nmid = 3\n").unwrap();
        let keys: Vec<_> = document.as_mapping().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn should_decode_json() {
        let document = decode("a.json", r#"{"domain": "template"}"#).unwrap();
        assert_eq!(document.get("domain"), Some(&Document::from("template")));
    }

    #[test]
    fn should_reject_unknown_extension() {
        let err = decode("a.yaml", "domain: template").unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFormat(path) if path == "a.yaml"));
    }

    #[test]
    fn should_report_path_when_toml_is_malformed() {
        let err = decode("broken.toml", "invalid {{{").unwrap_err();
        assert_eq!(err.to_string(), "failed to decode TOML blueprint broken.toml");
    }
}
