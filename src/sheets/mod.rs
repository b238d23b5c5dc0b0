pub mod auth;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::SheetsConfig;
use auth::ServiceAccountAuth;

pub const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

lazy_static! {
    // A1 notation with an optional (possibly quoted) tab name
    static ref A1_RANGE: Regex =
        Regex::new(r"^(?:(?:'[^']+'|[A-Za-z0-9_]+)!)?[A-Z]{1,3}[0-9]+(?::[A-Z]{1,3}[0-9]+)?$")
            .unwrap();
}

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request to spreadsheet service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Spreadsheet service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),
}

pub fn validate_range(range: &str) -> Result<(), SheetsError> {
    if A1_RANGE.is_match(range) {
        Ok(())
    } else {
        Err(SheetsError::InvalidRange(range.to_string()))
    }
}

/// Cell-range access to a remote spreadsheet.
#[async_trait]
pub trait CellStore: Send + Sync {
    /// Rows of cell values for `range`; an empty range yields no rows.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Writes `rows` starting at the top-left of `range` in a single request.
    async fn write_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError>;
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    range: &'a str,
    major_dimension: &'a str,
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct SheetsClient {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    base_url: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let http = reqwest::Client::new();
        let auth = ServiceAccountAuth::new(
            &config.client_email,
            &config.private_key,
            &config.token_uri,
            http.clone(),
        )?;

        Ok(Self {
            http,
            auth,
            base_url: config.base_url.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
        })
    }

    fn values_url(&self, range: &str) -> Result<Url, SheetsError> {
        validate_range(range)?;

        let mut url =
            Url::parse(&self.base_url).map_err(|e| SheetsError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values", range]);

        Ok(url)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);

    Err(SheetsError::Api {
        status: status.as_u16(),
        message,
    })
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl CellStore for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.values_url(range)?;
        let token = self.auth.access_token().await?;
        debug!("Reading {} from spreadsheet {}", range, self.spreadsheet_id);

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let body: ValueRange = check_status(response).await?.json().await?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn write_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError> {
        let mut url = self.values_url(range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", VALUE_INPUT_OPTION);
        let token = self.auth.access_token().await?;
        debug!("Writing {} to spreadsheet {}", range, self.spreadsheet_id);

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(&ValueRangeBody {
                range,
                major_dimension: "ROWS",
                values: rows,
            })
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }
}
