use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// The access token was rejected (expired, revoked or malformed).
  #[error("Authentication failed with status {status}: {body}")]
  Authentication { status: StatusCode, body: String },
  #[error("Request failed with status {status}: {body}")]
  Request { status: StatusCode, body: String },
  #[error("Invalid parameter: {0}")]
  InvalidParameter(String),
  #[error("Timed out waiting for the authorization callback")]
  AuthorizationTimeout,
  #[error("Authorization denied: {0}")]
  AuthorizationDenied(String),
  #[error("Token exchange failed with status {status}: {body}")]
  TokenExchange { status: StatusCode, body: String },
  #[error("Config error: {0}")]
  Config(String),
  #[error(transparent)]
  Reqwest(#[from] reqwest::Error),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Url(#[from] url::ParseError),
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),
  #[error(transparent)]
  TomlSer(#[from] toml::ser::Error),
}

impl Error {
  /// Maps a non-success status onto the matching error kind.
  pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
    match status {
      StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication { status, body },
      _ => Error::Request { status, body },
    }
  }

  pub fn is_authentication(&self) -> bool {
    matches!(self, Error::Authentication { .. })
  }
}
