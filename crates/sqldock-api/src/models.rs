//! JSON request and response models for the query endpoint.

use serde::{Deserialize, Serialize};

use sqldock_commons::{GatewayError, Row};
use sqldock_query::ExecutionOutcome;

/// Body of `POST /v1/query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

/// Error object nested in a failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Response envelope for `POST /v1/query`. Success and failure share the
/// shape; absent fields are omitted rather than serialized as null.
/// `execution_time` is in seconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl QueryResponse {
    pub fn success(outcome: &ExecutionOutcome) -> Self {
        Self {
            success: true,
            rows: (!outcome.rows.is_empty()).then(|| outcome.rows.clone()),
            row_count: (outcome.row_count > 0).then_some(outcome.row_count),
            execution_time: Some(outcome.elapsed.as_secs_f64()),
            error: None,
        }
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            success: false,
            rows: None,
            row_count: None,
            execution_time: None,
            error: Some(ErrorBody {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                detail: err.detail.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sqldock_commons::SqlValue;

    use super::*;

    #[test]
    fn success_response_shape() {
        let mut row = Row::new();
        row.push("id", SqlValue::Int(1));
        row.push("name", SqlValue::Text("Alice".into()));
        let outcome =
            ExecutionOutcome { rows: vec![row], row_count: 1, elapsed: Duration::from_millis(12) };

        let json = serde_json::to_value(QueryResponse::success(&outcome)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["rowCount"], 1);
        assert_eq!(json["rows"][0]["name"], "Alice");
        assert!(json["executionTime"].as_f64().unwrap() >= 0.012);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn empty_result_omits_rows_and_row_count() {
        let outcome =
            ExecutionOutcome { rows: vec![], row_count: 0, elapsed: Duration::from_millis(1) };
        let json = serde_json::to_value(QueryResponse::success(&outcome)).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("rows").is_none());
        assert!(json.get("rowCount").is_none());
    }

    #[test]
    fn failure_response_carries_the_error_object_only() {
        let err = GatewayError::query_too_large(20480, 10240);
        let json = serde_json::to_value(QueryResponse::failure(&err)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "QUERY_TOO_LARGE");
        assert!(json["error"]["detail"].as_str().unwrap().contains("20480"));
        assert!(json.get("rows").is_none());
        assert!(json.get("executionTime").is_none());
    }
}
