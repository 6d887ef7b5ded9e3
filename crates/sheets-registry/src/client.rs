//! Google Sheets values API client implementing the registry port.

use crate::auth::AccessTokenSource;
use crate::error::{SheetsError, SheetsResult};
use crate::range::RangeLayout;
use crate::rows::parse_rows;
use crate::summarize_response_body;
use access_reconciler::{CellRef, RegistryClient, RegistryResult, SubscriberRecord};
use async_trait::async_trait;
use gatekeeper_config_and_utils::SheetLayout;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Base URL of the Sheets v4 spreadsheets resource.
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueUpdate<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: [[&'a str; 1]; 1],
}

/// Subscriber registry stored in one sheet of a Google spreadsheet.
///
/// Every read goes to the API; nothing is cached besides the bearer token.
pub struct SheetsRegistry {
    http_client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    ranges: RangeLayout,
    tokens: Arc<dyn AccessTokenSource>,
}

impl SheetsRegistry {
    pub fn new(
        http_client: reqwest::Client,
        spreadsheet_id: impl Into<String>,
        layout: &SheetLayout,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> SheetsResult<Self> {
        Ok(Self {
            http_client,
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            ranges: RangeLayout::new(layout)?,
            tokens,
        })
    }

    /// Point the client at another endpoint (emulator or test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn ranges(&self) -> &RangeLayout {
        &self.ranges
    }

    /// Raw value grid of the subscriber range.
    pub async fn read_values(&self) -> SheetsResult<Vec<Vec<Value>>> {
        let range = self.ranges.read_range();
        let url = self.values_url(&range)?;
        let token = self.tokens.access_token().await?;

        debug!(range = %range, "Reading subscriber range");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await?;
        let response = self.check_response(response, "read").await?;

        let body: ValueRange = response.json().await?;
        match body.values {
            Some(values) if !values.is_empty() => Ok(values),
            _ => Err(SheetsError::EmptyRange),
        }
    }

    /// Overwrite one cell with a raw (unparsed) value.
    pub async fn update_cell(&self, cell: CellRef, value: &str) -> SheetsResult<()> {
        let range = self.ranges.cell_range(cell);
        let url = self.values_url(&range)?;
        let token = self.tokens.access_token().await?;

        let body = ValueUpdate {
            range: &range,
            major_dimension: "ROWS",
            values: [[value]],
        };

        let response = self
            .http_client
            .put(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&body)
            .send()
            .await?;
        self.check_response(response, "write").await?;

        info!(range = %range, "Updated registry cell");
        Ok(())
    }

    fn values_url(&self, range: &str) -> SheetsResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| SheetsError::InvalidRange(format!("bad base URL: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidRange("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend([self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    async fn check_response(
        &self,
        response: reqwest::Response,
        operation: &'static str,
    ) -> SheetsResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        error!(
            operation,
            status = status.as_u16(),
            body_summary = %body_summary,
            "Sheets API error"
        );
        Err(SheetsError::Api {
            status: status.as_u16(),
            message: format!("upstream error ({body_summary})"),
        })
    }
}

#[async_trait]
impl RegistryClient for SheetsRegistry {
    async fn fetch_rows(&self) -> RegistryResult<Vec<SubscriberRecord>> {
        let values = self.read_values().await?;
        let records = parse_rows(&values, &self.ranges);
        debug!(rows = values.len(), records = records.len(), "Fetched registry");
        // Rows without a single usable email mean a wrong layout, not zero customers.
        if records.is_empty() {
            warn!(rows = values.len(), "Registry range has no subscriber rows");
            return Err(SheetsError::EmptyRange.into());
        }
        Ok(records)
    }

    async fn write_cell(&self, cell: CellRef, value: &str) -> RegistryResult<()> {
        Ok(self.update_cell(cell, value).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use access_reconciler::RowRef;

    fn registry(base_url: &str) -> SheetsRegistry {
        SheetsRegistry::new(
            reqwest::Client::new(),
            "sheet-123",
            &SheetLayout::default(),
            Arc::new(StaticToken("token".to_string())),
        )
        .unwrap()
        .with_base_url(base_url)
    }

    #[test]
    fn values_url_encodes_range() {
        let registry = registry(SHEETS_API_BASE);
        let url = registry.values_url("'Paid Members'!A2:C").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/'Paid%20Members'!A2:C"
        );
    }

    #[test]
    fn values_url_tolerates_trailing_slash() {
        let registry = registry("http://127.0.0.1:9/v4/spreadsheets/");
        let url = registry.values_url("Subscribers!C7").unwrap();
        assert_eq!(
            url.path(),
            "/v4/spreadsheets/sheet-123/values/Subscribers!C7"
        );
    }

    #[test]
    fn update_body_shape() {
        let range = registry(SHEETS_API_BASE)
            .ranges()
            .cell_range(CellRef::linked_identity(RowRef(4)));
        let body = ValueUpdate {
            range: &range,
            major_dimension: "ROWS",
            values: [["42"]],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "range": "Subscribers!C4",
                "majorDimension": "ROWS",
                "values": [["42"]],
            })
        );
    }
}
