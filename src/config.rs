//! Endpoint configuration and the on-disk credentials file.
//!
//! The credentials file is a TOML document with a single `[exist]` table:
//!
//! ```toml
//! [exist]
//! client_id = "..."
//! client_secret = "..."
//! access_token = "..."
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const API_URL: &str = "https://exist.io/api/1";
pub const OAUTH_URL: &str = "https://exist.io/oauth2";

/// Default location of the credentials file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "./exist.cfg";

/// Base URLs of the resource API and the OAuth2 provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_url: String,
    pub oauth_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints { api_url: API_URL.to_string(), oauth_url: OAUTH_URL.to_string() }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialsFile {
    exist: Credentials,
}

impl Credentials {
    /// Reads the `[exist]` table from `path`. A missing file or key is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("could not read {}: {e}", path.display())))?;
        let file: CredentialsFile = toml::from_str(&content)?;
        Ok(file.exist)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(&CredentialsFile { exist: self.clone() })?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            client_id: "id-1".to_string(),
            client_secret: "shh".to_string(),
            access_token: "abc123".to_string(),
        }
    }

    #[test]
    fn given_no_overrides_when_default_endpoints_then_exist_urls() {
        let endpoints = Endpoints::default();

        assert_eq!(endpoints.api_url, "https://exist.io/api/1");
        assert_eq!(endpoints.oauth_url, "https://exist.io/oauth2");
    }

    #[test]
    fn given_saved_credentials_when_load_then_same_values() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("exist.cfg");
        credentials().save(&path).unwrap();

        // When
        let loaded = Credentials::load(&path).unwrap();

        // Then
        assert_eq!(loaded, credentials());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[exist]"));
    }

    #[test]
    fn given_missing_file_when_load_then_config_error() {
        let dir = tempfile::tempdir().unwrap();

        let error = Credentials::load(dir.path().join("absent.cfg")).unwrap_err();

        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn given_missing_key_when_load_then_error() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exist.cfg");
        fs::write(&path, "[exist]\nclient_id = \"id\"\nclient_secret = \"s\"\n").unwrap();

        // Then
        assert!(matches!(Credentials::load(&path), Err(Error::TomlDe(_))));
    }

    #[test]
    fn given_credentials_when_debug_printed_then_secrets_are_hidden() {
        let printed = format!("{:?}", credentials());

        assert!(printed.contains("id-1"));
        assert!(!printed.contains("abc123"));
        assert!(!printed.contains("shh"));
    }
}
