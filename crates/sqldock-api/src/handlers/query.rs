//! `POST /v1/query` handler.

use actix_web::http::StatusCode;
use actix_web::{post, web, HttpResponse};
use log::{error, info};

use sqldock_commons::GatewayError;
use sqldock_query::QueryExecutor;

use crate::models::{QueryRequest, QueryResponse};

/// Build the HTTP response for a gateway error, mapping its code to the
/// matching status.
pub fn error_response(err: &GatewayError) -> HttpResponse {
    let status = StatusCode::from_u16(err.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(QueryResponse::failure(err))
}

#[post("/query")]
pub async fn handle_query(
    executor: web::Data<dyn QueryExecutor>,
    req: web::Json<QueryRequest>,
) -> HttpResponse {
    if req.sql.trim().is_empty() {
        let err = GatewayError::missing_field("sql");
        error!("Query rejected: {}", err);
        return error_response(&err);
    }

    // Log a bounded prefix; statements can be 10KB.
    let preview: String = req.sql.chars().take(100).collect();
    info!("Executing query: {}", preview);

    match executor.execute(&req.sql).await {
        Ok(outcome) => {
            let elapsed_ms = outcome.elapsed.as_secs_f64() * 1000.0;
            info!("Query succeeded: {} rows returned in {:.2}ms", outcome.row_count, elapsed_ms);
            HttpResponse::Ok().json(QueryResponse::success(&outcome))
        }
        Err(err) => {
            error!("Query failed: {}", err);
            error_response(&err)
        }
    }
}

/// Fallback for `/v1/query` with any method other than POST.
pub async fn method_not_allowed() -> HttpResponse {
    error_response(&GatewayError::invalid_sql(
        "Only POST method is supported for /v1/query endpoint",
    ))
}
