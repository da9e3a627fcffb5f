//! Route table and JSON extractor configuration.

use actix_web::{error, web};

use sqldock_commons::GatewayError;

use crate::handlers;

/// JSON extractor tuned to the API contract: a body that fails to parse
/// is INVALID_SQL, a body missing the `sql` field is
/// MISSING_REQUIRED_FIELD, both as regular 400 envelopes.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let gateway_err = match &err {
            error::JsonPayloadError::Deserialize(de)
                if de.to_string().contains("missing field") =>
            {
                GatewayError::missing_field("sql")
            }
            _ => GatewayError::invalid_sql("Invalid JSON request body"),
        };
        let response = handlers::query::error_response(&gateway_err);
        error::InternalError::from_response(err, response).into()
    })
}

/// Mount the `/v1` API. Expects `Data<dyn QueryExecutor>` and
/// `Data<EngineSupervisor>` to be registered on the app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("/v1")
            .service(handlers::query::handle_query)
            .service(handlers::health::healthcheck)
            .route("/query", web::to(handlers::query::method_not_allowed)),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{test, App};
    use async_trait::async_trait;

    use sqldock_commons::{GatewayError, Row, SqlValue};
    use sqldock_configs::EngineSettings;
    use sqldock_engine::EngineSupervisor;
    use sqldock_query::{ExecutionOutcome, QueryExecutor};

    use super::*;

    struct StubExecutor {
        result: Result<ExecutionOutcome, GatewayError>,
    }

    #[async_trait]
    impl QueryExecutor for StubExecutor {
        async fn execute(&self, _sql: &str) -> Result<ExecutionOutcome, GatewayError> {
            self.result.clone()
        }
    }

    fn one_row_outcome() -> ExecutionOutcome {
        let mut row = Row::new();
        row.push("id", SqlValue::Int(1));
        ExecutionOutcome { rows: vec![row], row_count: 1, elapsed: Duration::from_millis(3) }
    }

    macro_rules! test_app {
        ($stub:expr) => {{
            let executor: Arc<dyn QueryExecutor> = Arc::new($stub);
            let supervisor = Arc::new(EngineSupervisor::new(EngineSettings::default()));
            test::init_service(
                App::new()
                    .app_data(web::Data::from(executor))
                    .app_data(web::Data::from(supervisor))
                    .configure(configure),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn post_valid_query_returns_success_envelope() {
        let app = test_app!(StubExecutor { result: Ok(one_row_outcome()) });

        let req = test::TestRequest::post()
            .uri("/v1/query")
            .set_json(serde_json::json!({"sql": "SELECT 1"}))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp["success"], true);
        assert_eq!(resp["rowCount"], 1);
        assert_eq!(resp["rows"][0]["id"], 1);
        assert!(resp["executionTime"].as_f64().unwrap() > 0.0);
    }

    #[actix_web::test]
    async fn missing_sql_field_is_missing_required_field() {
        let app = test_app!(StubExecutor { result: Ok(one_row_outcome()) });

        let req = test::TestRequest::post()
            .uri("/v1/query")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "MISSING_REQUIRED_FIELD");
    }

    #[actix_web::test]
    async fn empty_sql_is_missing_required_field() {
        let app = test_app!(StubExecutor { result: Ok(one_row_outcome()) });

        let req = test::TestRequest::post()
            .uri("/v1/query")
            .set_json(serde_json::json!({"sql": "   "}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "MISSING_REQUIRED_FIELD");
    }

    #[actix_web::test]
    async fn malformed_json_is_invalid_sql() {
        let app = test_app!(StubExecutor { result: Ok(one_row_outcome()) });

        let req = test::TestRequest::post()
            .uri("/v1/query")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not valid json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_SQL");
    }

    #[actix_web::test]
    async fn non_post_method_is_rejected() {
        let app = test_app!(StubExecutor { result: Ok(one_row_outcome()) });

        let req = test::TestRequest::get().uri("/v1/query").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_SQL");
        assert!(body["error"]["detail"].as_str().unwrap().contains("POST"));
    }

    #[actix_web::test]
    async fn executor_errors_map_to_their_status() {
        let cases = [
            (GatewayError::query_timeout(5), 408, "QUERY_TIMEOUT"),
            (GatewayError::result_too_large(1000), 413, "RESULT_TOO_LARGE"),
            (GatewayError::database_unavailable("engine down"), 503, "DATABASE_UNAVAILABLE"),
            (GatewayError::internal("boom"), 500, "INTERNAL_ERROR"),
        ];

        for (err, status, code) in cases {
            let app = test_app!(StubExecutor { result: Err(err) });
            let req = test::TestRequest::post()
                .uri("/v1/query")
                .set_json(serde_json::json!({"sql": "SELECT 1"}))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), status, "{}", code);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["code"], code);
        }
    }

    #[actix_web::test]
    async fn healthcheck_reports_engine_state() {
        let app = test_app!(StubExecutor { result: Ok(one_row_outcome()) });

        let req = test::TestRequest::get().uri("/v1/healthcheck").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "unavailable");
        assert_eq!(body["engine"], "not_started");
    }
}
