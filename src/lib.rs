//! Client for the [Exist](https://exist.io) REST API.
//!
//! [`ExistAuth`] runs the OAuth2 browser flow once to obtain an access token;
//! [`Exist`] then reads the user profile and one page at a time of attributes,
//! insights, averages and correlations.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod service;

pub use auth::{AuthSettings, Browser, ExistAuth, SystemBrowser, Token};
pub use config::{Credentials, Endpoints, API_URL, DEFAULT_CONFIG_FILE, OAUTH_URL};
pub use error::{Error, Result};
pub use model::{Attribute, Average, Correlation, Insight, Record, User};
pub use query::{Query, MAX_LIMIT};
pub use service::{Exist, ExistApi};
