//! Credential persistence for the API client.
//!
//! Credentials live in a small YAML preference file keyed by fixed names
//! (`auth_type`, `basic_auth_token`, `api_key`). Only one mode is stored at a
//! time: saving one mode removes the other's material, and a file whose tag
//! and material disagree reads back as "no credential".

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const AUTH_TYPE_KEY: &str = "auth_type";
const BASIC_TOKEN_KEY: &str = "basic_auth_token";
const API_KEY_KEY: &str = "api_key";

type Preferences = BTreeMap<String, serde_yaml::Value>;

/// Authentication mode tag stored under `auth_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    ApiKey,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Basic => "Basic",
            AuthMode::ApiKey => "ApiKey",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "Basic" => Some(AuthMode::Basic),
            "ApiKey" => Some(AuthMode::ApiKey),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The active authentication material.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Base64 of `user:password`, sent as `Authorization: Basic <token>`.
    Basic { token: String },
    /// Static key, sent as `X-API-KEY: <key>`.
    ApiKey { key: String },
}

impl Credential {
    /// Builds a Basic credential from a username and password.
    pub fn basic(username: &str, password: &str) -> Self {
        Credential::Basic {
            token: STANDARD.encode(format!("{}:{}", username, password)),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Credential::ApiKey { key: key.into() }
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Credential::Basic { .. } => AuthMode::Basic,
            Credential::ApiKey { .. } => AuthMode::ApiKey,
        }
    }

    /// Returns the secret with everything but the edges masked, for display.
    pub fn masked(&self) -> String {
        let secret = match self {
            Credential::Basic { token } => token,
            Credential::ApiKey { key } => key,
        };
        let chars: Vec<char> = secret.chars().collect();
        if chars.len() > 8 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            "****".to_string()
        }
    }
}

// Never print secrets through Debug.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("mode", &self.mode())
            .field("secret", &self.masked())
            .finish()
    }
}

/// File-backed preference area holding the active credential.
///
/// Writes go to a sibling temp file which is then renamed over the original,
/// so a reader sees either the old or the new credential, never a mix.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the preference file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored credential.
    ///
    /// Returns `Ok(None)` if the file doesn't exist or holds no complete
    /// credential.
    pub fn load(&self) -> Result<Option<Credential>, CredentialError> {
        let prefs = self.read()?;
        Ok(credential_from(&prefs))
    }

    /// Persists `credential` as the only stored credential.
    pub fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let mut prefs = self.read()?;
        prefs.remove(BASIC_TOKEN_KEY);
        prefs.remove(API_KEY_KEY);

        let (key, secret) = match credential {
            Credential::Basic { token } => (BASIC_TOKEN_KEY, token),
            Credential::ApiKey { key } => (API_KEY_KEY, key),
        };
        prefs.insert(key.to_string(), secret.clone().into());
        prefs.insert(
            AUTH_TYPE_KEY.to_string(),
            credential.mode().as_str().to_string().into(),
        );

        self.write(&prefs)
    }

    /// Removes every credential field, leaving unrelated preferences intact.
    pub fn clear(&self) -> Result<(), CredentialError> {
        let mut prefs = self.read()?;
        let had_any = [AUTH_TYPE_KEY, BASIC_TOKEN_KEY, API_KEY_KEY]
            .iter()
            .fold(false, |acc, key| prefs.remove(*key).is_some() || acc);

        if had_any {
            self.write(&prefs)?;
        }
        Ok(())
    }

    fn read(&self) -> Result<Preferences, CredentialError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Preferences::new()),
            Err(e) => return Err(CredentialError::ReadError(self.path.clone(), e)),
        };

        if contents.trim().is_empty() {
            return Ok(Preferences::new());
        }

        serde_yaml::from_str(&contents)
            .map_err(|e| CredentialError::ParseError(self.path.clone(), e))
    }

    fn write(&self, prefs: &Preferences) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CredentialError::WriteError(parent.to_path_buf(), e))?;
        }

        let yaml = serde_yaml::to_string(prefs)
            .map_err(|e| CredentialError::ParseError(self.path.clone(), e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, yaml).map_err(|e| CredentialError::WriteError(tmp.clone(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CredentialError::WriteError(self.path.clone(), e))
    }
}

fn credential_from(prefs: &Preferences) -> Option<Credential> {
    let field = |key: &str| prefs.get(key).and_then(|v| v.as_str()).map(str::to_string);

    match field(AUTH_TYPE_KEY).as_deref().and_then(AuthMode::parse)? {
        AuthMode::Basic => field(BASIC_TOKEN_KEY).map(|token| Credential::Basic { token }),
        AuthMode::ApiKey => field(API_KEY_KEY).map(|key| Credential::ApiKey { key }),
    }
}

/// Errors reading or writing the preference file.
#[derive(Debug)]
pub enum CredentialError {
    ReadError(PathBuf, io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    WriteError(PathBuf, io::Error),
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::ReadError(path, e) => {
                write!(f, "Failed to read preferences '{}': {}", path.display(), e)
            }
            CredentialError::ParseError(path, e) => {
                write!(f, "Invalid preferences file '{}': {}", path.display(), e)
            }
            CredentialError::WriteError(path, e) => {
                write!(f, "Failed to write preferences '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for CredentialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CredentialError::ReadError(_, e) | CredentialError::WriteError(_, e) => Some(e),
            CredentialError::ParseError(_, e) => Some(e),
        }
    }
}
