use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use exist::{Query, API_URL, DEFAULT_CONFIG_FILE, OAUTH_URL};

/// Command line client for the Exist API. Run `authorize` once to store an access
/// token, then query the user profile and the attribute collections.
#[derive(Parser)]
#[clap(version, about)]
pub(crate) struct Cli {
  #[clap(subcommand)]
  pub(crate) command: Command,
  /// Use the config file specified.
  #[clap(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
  pub(crate) config: PathBuf,
  /// Base URL of the resource API.
  #[clap(long, global = true, env = "EXIST_API_URL", default_value = API_URL, hide = true)]
  pub(crate) api_url: String,
  /// Base URL of the OAuth2 provider.
  #[clap(long, global = true, env = "EXIST_OAUTH_URL", default_value = OAUTH_URL, hide = true)]
  pub(crate) oauth_url: String,
}

#[derive(Subcommand)]
pub(crate) enum Command {
  /// Authorize this client in the browser and write the credentials to the config file.
  Authorize {
    /// App key of your Exist app.
    #[clap(long, env = "EXIST_CLIENT_ID")]
    client_id: String,
    /// App secret of your Exist app.
    #[clap(long, env = "EXIST_CLIENT_SECRET")]
    client_secret: String,
    /// Local port the authorization callback is received on.
    #[clap(long, default_value = "8000")]
    port: u16,
    /// Seconds to wait for the browser to complete the authorization.
    #[clap(long, default_value = "120")]
    timeout: u64,
  },
  /// Show the profile of the authorized user.
  User,
  /// List attributes.
  Attributes(ListArgs),
  /// List insights.
  Insights(ListArgs),
  /// List averages.
  Averages(ListArgs),
  /// List correlations.
  Correlations(ListArgs),
}

#[derive(Args)]
pub(crate) struct ListArgs {
  /// Only return results for this attribute.
  pub(crate) attribute_name: Option<String>,
  /// Number of values to return per page. Max is 100.
  #[clap(long, value_parser = clap::value_parser!(u32).range(1..=100))]
  pub(crate) limit: Option<u32>,
  /// Page index, starting at 1.
  #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
  pub(crate) page: Option<u32>,
  /// Oldest date (inclusive) of results to be returned, in format YYYY-mm-dd.
  #[clap(long)]
  pub(crate) date_min: Option<NaiveDate>,
  /// Most recent date (inclusive) of results to be returned, in format YYYY-mm-dd.
  #[clap(long)]
  pub(crate) date_max: Option<NaiveDate>,
}

impl ListArgs {
  pub(crate) fn query(&self) -> Query {
    Query { limit: self.limit, page: self.page, date_min: self.date_min, date_max: self.date_max }
  }
}
