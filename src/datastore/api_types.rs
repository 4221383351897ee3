//! Serde types matching the `datastore_search` API responses.

use serde::{Deserialize, Serialize};

/// Envelope returned by `datastore_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreResponse {
  #[serde(default)]
  pub help: String,
  pub success: bool,
  #[serde(default)]
  pub result: Option<DatastoreResult>,
}

impl DatastoreResponse {
  pub fn records(&self) -> &[ApiRecord] {
    self
      .result
      .as_ref()
      .map(|r| r.records.as_slice())
      .unwrap_or(&[])
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreResult {
  #[serde(default)]
  pub resource_id: String,
  #[serde(default)]
  pub fields: Vec<ApiField>,
  #[serde(default)]
  pub records: Vec<ApiRecord>,
  #[serde(rename = "_links", default)]
  pub links: Option<ApiLinks>,
  pub limit: Option<u32>,
  #[serde(default)]
  pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiField {
  pub id: String,
  #[serde(rename = "type")]
  pub field_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLinks {
  pub start: Option<String>,
  pub next: Option<String>,
}

/// One quarterly row of the dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRecord {
  #[serde(rename = "_id")]
  pub id: u64,
  /// e.g. "2004-Q3"
  pub quarter: String,
  /// Petabytes, as a decimal string
  pub volume_of_mobile_data: String,
}

/// Error body returned alongside non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
  pub status: String,
  #[serde(default)]
  pub message: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_datastore_response() {
    let body = r#"{
      "help": "https://data.gov.sg/api/3/action/help_show?name=datastore_search",
      "success": true,
      "result": {
        "resource_id": "a807b7ab-6cad-4aa6-87d0-e283a7353a0f",
        "fields": [{"type": "int4", "id": "_id"}, {"type": "text", "id": "quarter"}],
        "records": [
          {"volume_of_mobile_data": "0.000384", "quarter": "2004-Q3", "_id": 1}
        ],
        "_links": {"start": "/api/action/datastore_search?resource_id=x", "next": "/api/action/datastore_search?offset=100"},
        "limit": 100,
        "total": 59
      }
    }"#;

    let response: DatastoreResponse = serde_json::from_str(body).unwrap();
    assert!(response.success);
    assert_eq!(response.records().len(), 1);
    assert_eq!(response.records()[0].quarter, "2004-Q3");
    let result = response.result.unwrap();
    assert_eq!(result.total, 59);
    assert_eq!(result.fields[1].field_type, "text");
  }

  #[test]
  fn test_unsuccessful_response_without_result() {
    let response: DatastoreResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
    assert!(!response.success);
    assert!(response.records().is_empty());
  }

  #[test]
  fn test_parse_error_body() {
    let body: ApiErrorBody =
      serde_json::from_str(r#"{"status": "AUTH_ERROR", "message": "token expired"}"#).unwrap();
    assert_eq!(body.status, "AUTH_ERROR");
    assert_eq!(body.message, "token expired");
  }
}
