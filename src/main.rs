mod cli;
mod progress;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use exist::{AuthSettings, Browser, Credentials, Endpoints, Error, Exist, ExistApi, ExistAuth, Record};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use progress::SpinnerHelper;

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let Cli { command, config, api_url, oauth_url } = Cli::parse();
  let endpoints = Endpoints { api_url, oauth_url };

  let result = match command {
    Command::Authorize { client_id, client_secret, port, timeout } => {
      let settings = AuthSettings {
        redirect_addr: SocketAddr::from(([127, 0, 0, 1], port)),
        timeout: Duration::from_secs(timeout),
        ..AuthSettings::default()
      };
      let auth = ExistAuth::new(client_id.as_str(), client_secret.as_str(), endpoints.oauth_url.as_str())
        .with_settings(settings);
      authorize(&config, &auth, client_id, client_secret)
        .await
        .map(|authorized| if authorized { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
    command => match Credentials::load(&config) {
      Ok(credentials) => get_resource(Exist::from_credentials(&endpoints, &credentials), command)
        .await
        .map(|()| ExitCode::SUCCESS),
      Err(e) => {
        tracing::debug!(error = %e, "could not load credentials");
        println!("Missing config information, please run \"exist authorize\"");
        return ExitCode::FAILURE;
      }
    },
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      if e.is_authentication() {
        eprintln!("{e}\nThe access token was rejected, please run \"exist authorize\" again.");
      } else {
        eprintln!("{e}");
      }
      ExitCode::FAILURE
    }
  }
}

/// Runs the browser flow and stores the credentials. Returns `false` when no
/// token was obtained, in which case nothing is written.
async fn authorize<B: Browser>(
  config: &Path,
  auth: &ExistAuth<B>,
  client_id: String,
  client_secret: String,
) -> Result<bool, Error> {
  let spinner = SpinnerHelper::create("Waiting for authorization in the browser".to_string());

  match auth.browser_authorize().await {
    Some(access_token) => {
      spinner.finish_with_message("Authorized");
      Credentials { client_id, client_secret, access_token }.save(config)?;
      println!("Credentials written to {}", config.display());
      Ok(true)
    }
    None => {
      spinner.abandon_with_message("Authorization failed");
      println!("ERROR: We were unable to authorize to use the Exist API.");
      Ok(false)
    }
  }
}

async fn get_resource(exist: Exist, command: Command) -> Result<(), Error> {
  match command {
    Command::User => print(exist.user().await?.data()),
    Command::Attributes(args) => print_all(exist.attributes(args.attribute_name.as_deref(), &args.query()).await?),
    Command::Insights(args) => print_all(exist.insights(args.attribute_name.as_deref(), &args.query()).await?),
    Command::Averages(args) => print_all(exist.averages(args.attribute_name.as_deref(), &args.query()).await?),
    Command::Correlations(args) => {
      print_all(exist.correlations(args.attribute_name.as_deref(), &args.query()).await?)
    }
    Command::Authorize { .. } => Ok(()),
  }
}

fn print_all<R: Record>(records: Vec<R>) -> Result<(), Error> {
  let data: Vec<_> = records.into_iter().map(Record::into_inner).collect();
  print(&data)
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<(), Error> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
