use log::debug;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clients::{
    errors::{Error, Result},
    google_auth::{CredentialProvider, GoogleToken, obtain_token},
    traits::Spreadsheet,
};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

#[derive(Deserialize, Debug)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize, Debug)]
struct ValueRangeBody<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'a str,
    values: Vec<[&'a str; 1]>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

/// Google Sheets v4 values client for one spreadsheet.
pub struct SheetsClient {
    http: Client,
    spreadsheet_id: String,
    base_url: Url,
    token: Option<GoogleToken>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(SHEETS_API_BASE)
            .map_err(|e| Error::ConfigurationError(format!("Invalid Sheets API URL: {e}")))?;
        Ok(SheetsClient {
            http: Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            base_url,
            token: None,
        })
    }

    // Authorize the client with a stored, refreshed or freshly consented token
    // A browser window may be opened on this call
    pub async fn authorize_client<P: CredentialProvider>(&mut self, provider: &P) -> Result<()> {
        debug!("Starting Google Sheets authorization ...");
        self.token = Some(obtain_token(provider).await?);
        Ok(())
    }

    fn access_token(&self) -> Result<&str> {
        self.token
            .as_ref()
            .map(|t| t.access_token.as_str())
            .ok_or_else(|| Error::GoogleAuthError("Sheets client is not authorized".into()))
    }

    /// `<base>/<spreadsheet id>/values/<range>`, with each part escaped as a path segment.
    pub fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::ConfigurationError("Sheets API URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        Err(Error::SheetsApiError {
            status: status.as_u16(),
            message,
        })
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Spreadsheet for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(range)?;
        debug!("Reading range {range} from spreadsheet {}", self.spreadsheet_id);
        let response = self
            .http
            .get(url)
            .bearer_auth(self.access_token()?)
            .send()
            .await?;
        let body: ValueRange = Self::check(response).await?.json().await?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_column(&self, range: &str, values: &[String]) -> Result<()> {
        let mut url = self.values_url(range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = ValueRangeBody {
            range,
            major_dimension: "ROWS",
            values: values.iter().map(|v| [v.as_str()]).collect(),
        };
        debug!("Writing {} values to range {range}", values.len());
        let response = self
            .http
            .put(url)
            .bearer_auth(self.access_token()?)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_url_escapes_range() {
        let client = SheetsClient::new("sheet-id").unwrap();
        let url = client.values_url("'My Sheet'!A3:C500").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/'My%20Sheet'!A3:C500"
        );
        let plain = client.values_url("K3:K4").unwrap();
        assert!(plain.as_str().ends_with("/sheet-id/values/K3:K4"));
    }

    #[test]
    fn cells_are_converted_to_text() {
        let range: ValueRange = serde_json::from_value(json!({
            "range": "Sheet1!A3:C500",
            "majorDimension": "ROWS",
            "values": [["Muse", "Hysteria", "Alice"], ["Blink", 182], []]
        }))
        .unwrap();
        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        assert_eq!(rows[0], vec!["Muse", "Hysteria", "Alice"]);
        assert_eq!(rows[1], vec!["Blink", "182"]);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn empty_range_has_no_values_key() {
        let range: ValueRange =
            serde_json::from_value(json!({"range": "A3:C500", "majorDimension": "ROWS"})).unwrap();
        assert!(range.values.is_empty());
    }

    #[test]
    fn write_body_has_one_value_per_row() {
        let links = vec!["https://open.spotify.com/track/1".to_string(), String::new()];
        let body = ValueRangeBody {
            range: "K3:K4",
            major_dimension: "ROWS",
            values: links.iter().map(|v| [v.as_str()]).collect(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "range": "K3:K4",
                "majorDimension": "ROWS",
                "values": [["https://open.spotify.com/track/1"], [""]]
            })
        );
    }

    #[tokio::test]
    async fn unauthorized_client_does_not_send_requests() {
        let client = SheetsClient::new("sheet-id").unwrap();
        let err = client.read_range("A3:C500").await.unwrap_err();
        assert!(matches!(err, Error::GoogleAuthError(_)));
    }
}
