//! API key resolution for the document analysis service.
//!
//! The key file (`ocr.api_key_file`, Docker secrets style) wins over the
//! environment variable named by `ocr.api_key_env`.

use secrecy::SecretString;

use crate::config::schema::expand_home;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No API key configured (set ocr.api_key_file or ocr.api_key_env)")]
    NoSourceProvided,

    #[error("Failed to read API key from '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("API key from {source_name} is empty")]
    Empty { source_name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Reads the key from `file_path`, else from `env_var`. Empty source names
/// are skipped and values are trimmed; a blank key is an error.
pub fn resolve_secret(file_path: Option<&str>, env_var: Option<&str>) -> Result<SecretString> {
    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content =
            std::fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                path: expanded.display().to_string(),
                source: e,
            })?;
        return non_empty(content, || format!("file '{}'", path));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => non_empty(value, || format!("${}", name)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

fn non_empty(value: String, source_name: impl FnOnce() -> String) -> Result<SecretString> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SecretError::Empty {
            source_name: source_name(),
        });
    }
    Ok(SecretString::from(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_file_takes_priority_over_env() {
        let mut key_file = NamedTempFile::new().unwrap();
        writeln!(key_file, "  file-key").unwrap();

        std::env::set_var("SOPN_TEST_OCR_KEY_1", "env-key");
        let key = resolve_secret(
            Some(key_file.path().to_str().unwrap()),
            Some("SOPN_TEST_OCR_KEY_1"),
        )
        .unwrap();
        assert_eq!(key.expose_secret(), "file-key");

        let key = resolve_secret(Some(""), Some("SOPN_TEST_OCR_KEY_1")).unwrap();
        assert_eq!(key.expose_secret(), "env-key");
        std::env::remove_var("SOPN_TEST_OCR_KEY_1");
    }

    #[test]
    #[serial]
    fn test_blank_key_is_rejected() {
        std::env::set_var("SOPN_TEST_OCR_KEY_2", " \n");
        assert!(matches!(
            resolve_secret(None, Some("SOPN_TEST_OCR_KEY_2")),
            Err(SecretError::Empty { source_name }) if source_name == "$SOPN_TEST_OCR_KEY_2"
        ));
        std::env::remove_var("SOPN_TEST_OCR_KEY_2");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            resolve_secret(None, None),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(matches!(
            resolve_secret(Some(""), Some("")),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(matches!(
            resolve_secret(Some("/nonexistent/ocr.key"), None),
            Err(SecretError::FileReadError { .. })
        ));
        assert!(matches!(
            resolve_secret(None, Some("SOPN_DEFINITELY_NOT_SET_12345")),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }
}
