use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};

/// Largest page size the API accepts.
pub const MAX_LIMIT: u32 = 100;

/// Pagination and date filters for the list endpoints.
///
/// Every field is optional and absent fields are left out of the query string
/// entirely, so the server applies its own defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Oldest date (inclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_min: Option<NaiveDate>,
    /// Most recent date (inclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_max: Option<NaiveDate>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn date_min(mut self, date: NaiveDate) -> Self {
        self.date_min = Some(date);
        self
    }

    pub fn date_max(mut self, date: NaiveDate) -> Self {
        self.date_max = Some(date);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(Error::InvalidParameter(format!(
                    "limit must be between 1 and {MAX_LIMIT}, got {limit}"
                )));
            }
        }
        if self.page == Some(0) {
            return Err(Error::InvalidParameter("page must be at least 1".to_string()));
        }
        if let (Some(min), Some(max)) = (self.date_min, self.date_max) {
            if min > max {
                return Err(Error::InvalidParameter(format!(
                    "date_min {min} is after date_max {max}"
                )));
            }
        }
        Ok(())
    }
}
