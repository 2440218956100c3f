use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::client::{ApiClient, NO_QUERY};
use crate::config::{Credentials, Endpoints};
use crate::error::Result;
use crate::model::{Attribute, Average, Correlation, Insight, Page, Record, User};
use crate::query::Query;

/// Read access to the resource collections of one authorized user.
///
/// List calls return the records of a single page. Nothing is carried from one
/// call to the next; ask for `page + 1` to continue.
#[async_trait]
pub trait ExistApi {
    async fn user(&self) -> Result<User>;

    async fn attributes(&self, attribute_name: Option<&str>, query: &Query) -> Result<Vec<Attribute>>;

    async fn insights(&self, attribute_name: Option<&str>, query: &Query) -> Result<Vec<Insight>>;

    async fn averages(&self, attribute_name: Option<&str>, query: &Query) -> Result<Vec<Average>>;

    async fn correlations(&self, attribute_name: Option<&str>, query: &Query)
        -> Result<Vec<Correlation>>;
}

pub struct Exist {
    client: ApiClient,
}

impl Exist {
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Exist::with_client(Client::new(), api_url, access_token)
    }

    pub fn with_client(
        client: Client,
        api_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Exist { client: ApiClient::new(client, api_url, access_token) }
    }

    pub fn from_credentials(endpoints: &Endpoints, credentials: &Credentials) -> Self {
        Exist::new(endpoints.api_url.as_str(), credentials.access_token.as_str())
    }

    async fn list<R: Record>(
        &self,
        collection: &str,
        attribute_name: Option<&str>,
        query: &Query,
    ) -> Result<Vec<R>> {
        query.validate()?;
        let segments = resource_segments(collection, attribute_name);
        let page: Page = self.client.get(&segments, query).await?;
        let records = page.into_records()?;
        info!(collection, count = records.len(), "page fetched");
        Ok(records)
    }
}

#[async_trait]
impl ExistApi for Exist {
    async fn user(&self) -> Result<User> {
        let value = self.client.get(&["users", "$self"], NO_QUERY).await?;
        User::from_value(value)
    }

    async fn attributes(&self, attribute_name: Option<&str>, query: &Query) -> Result<Vec<Attribute>> {
        self.list("attributes", attribute_name, query).await
    }

    async fn insights(&self, attribute_name: Option<&str>, query: &Query) -> Result<Vec<Insight>> {
        self.list("insights", attribute_name, query).await
    }

    async fn averages(&self, attribute_name: Option<&str>, query: &Query) -> Result<Vec<Average>> {
        self.list("averages", attribute_name, query).await
    }

    async fn correlations(
        &self,
        attribute_name: Option<&str>,
        query: &Query,
    ) -> Result<Vec<Correlation>> {
        self.list("correlations", attribute_name, query).await
    }
}

/// `attributes/` for every attribute, `attributes/<name>/` for one.
fn resource_segments<'a>(collection: &'a str, attribute_name: Option<&'a str>) -> Vec<&'a str> {
    let mut segments = vec![collection];
    segments.extend(attribute_name);
    segments
}
