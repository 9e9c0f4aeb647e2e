use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::middleware::Next;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info_span, Instrument, Span};
use uuid::Uuid;

use crate::metrics::SequenceMetrics;
use crate::number_assembler::{AssembleError, NumberAssembler};
use crate::numbering_rule::NumberingRules;
use crate::sequence_generator::{SequenceError, SequenceGenerator};
use crate::sequence_store::{SequenceCategory, UnknownCategory};
use crate::tenant_registry::{RegistryError, Tenant, TenantId, TenantRegistry};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct AppState {
    pub tenants: Arc<dyn TenantRegistry>,
    pub sequences: Arc<dyn SequenceGenerator>,
    pub rules: NumberingRules,
    pub assembler: NumberAssembler,
    pub metrics: Arc<SequenceMetrics>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    InvalidCategory(#[from] UnknownCategory),

    #[error("Year out of range: {0}")]
    InvalidYear(i32),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Tenant not found: {0}")]
    TenantNotFound(TenantId),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidCategory(_) | ApiError::InvalidYear(_) | ApiError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::TenantNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Sequence(SequenceError::ReferenceNotFound(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sequence(SequenceError::ConcurrencyConflict(_)) => StatusCode::CONFLICT,
            ApiError::Sequence(SequenceError::Storage(_)) | ApiError::Registry(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Assemble(_) | ApiError::Metrics(_) | ApiError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TenantPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextValueResponse {
    pub tenant_id: TenantId,
    pub year: i32,
    pub category: SequenceCategory,
    pub value: i64,
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeekResponse {
    pub tenant_id: TenantId,
    pub year: i32,
    pub category: SequenceCategory,
    pub next_value: i64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics))
        .route("/api/tenants/{tenantId}", web::put().to(register_tenant))
        .route("/api/tenants/{tenantId}", web::get().to(get_tenant))
        .route(
            "/api/tenants/{tenantId}/sequences/{category}/next",
            web::post().to(next_value),
        )
        .route(
            "/api/tenants/{tenantId}/sequences/{category}",
            web::get().to(peek_next),
        );
}

/// Tags each request with a fresh id, both in its tracing span and in the
/// response headers.
pub async fn request_id(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %req.method(),
        path = %req.path()
    );
    let mut res = next.call(req).instrument(span.clone()).await?;
    let value = HeaderValue::from_str(&request_id.to_string())
        .map_err(actix_web::error::ErrorInternalServerError)?;
    res.headers_mut()
        .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    span.in_scope(|| debug!(status = res.status().as_u16(), "request finished"));
    Ok(res)
}

/// Runs a synchronous store call on the blocking pool, inside the caller's span.
async fn run_blocking<T, E, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| ApiError::Blocking(e.to_string()))?
        .map_err(Into::into)
}

fn resolve_year(year: Option<i32>) -> Result<i32, ApiError> {
    let year = year.unwrap_or_else(|| chrono::Utc::now().year());
    if (1..=9999).contains(&year) {
        Ok(year)
    } else {
        Err(ApiError::InvalidYear(year))
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().body("ok")
}

async fn metrics(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let body = state.metrics.render()?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

async fn register_tenant(
    tenant_id: web::Path<u64>,
    payload: web::Json<TenantPayload>,
    state: web::Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let name = payload.into_inner().name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::InvalidPayload("tenant name must not be empty".to_string()));
    }
    let tenant = Tenant {
        id: TenantId(tenant_id.into_inner()),
        name,
    };

    let tenants = state.tenants.clone();
    let registered = tenant.clone();
    run_blocking(move || tenants.register_tenant(registered)).await?;

    Ok(web::Json(tenant))
}

async fn get_tenant(
    tenant_id: web::Path<u64>,
    state: web::Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let tenant_id = TenantId(tenant_id.into_inner());
    let tenants = state.tenants.clone();
    match run_blocking(move || tenants.get_tenant(tenant_id)).await? {
        Some(tenant) => Ok(web::Json(tenant)),
        None => Err(ApiError::TenantNotFound(tenant_id)),
    }
}

async fn next_value(
    path: web::Path<(u64, String)>,
    query: web::Query<YearQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let (tenant_id, category) = path.into_inner();
    let tenant_id = TenantId(tenant_id);
    let category: SequenceCategory = category.parse()?;
    let year = resolve_year(query.year)?;

    let sequences = state.sequences.clone();
    let value = run_blocking(move || sequences.next_value(tenant_id, year, category)).await?;

    let rule = state.rules.get(category);
    let reference = state.assembler.assemble_number(tenant_id, year, &rule, value)?;

    Ok(web::Json(NextValueResponse {
        tenant_id,
        year,
        category,
        value,
        reference,
    }))
}

async fn peek_next(
    path: web::Path<(u64, String)>,
    query: web::Query<YearQuery>,
    state: web::Data<AppState>,
) -> Result<impl Responder, ApiError> {
    let (tenant_id, category) = path.into_inner();
    let tenant_id = TenantId(tenant_id);
    let category: SequenceCategory = category.parse()?;
    let year = resolve_year(query.year)?;

    let sequences = state.sequences.clone();
    let next_value = run_blocking(move || sequences.peek_next(tenant_id, year, category)).await?;

    Ok(web::Json(PeekResponse {
        tenant_id,
        year,
        category,
        next_value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence_generator::ConsecutiveSequenceService;
    use crate::sequence_store::InMemorySequenceStore;
    use crate::tenant_registry::InMemoryTenantRegistry;
    use actix_web::middleware::from_fn;
    use actix_web::{test, App};
    use serde_json::json;

    fn in_memory_state() -> web::Data<AppState> {
        let tenants = Arc::new(InMemoryTenantRegistry::new());
        let store = Arc::new(InMemorySequenceStore::new(tenants.clone()));
        let metrics = Arc::new(SequenceMetrics::new().unwrap());
        let sequences = ConsecutiveSequenceService::new(store).with_metrics(metrics.clone());
        web::Data::new(AppState {
            tenants,
            sequences: Arc::new(sequences),
            rules: NumberingRules::default(),
            assembler: NumberAssembler::new(),
            metrics,
        })
    }

    #[actix_web::test]
    async fn test_register_and_generate_numbers() {
        let app = test::init_service(
            App::new()
                .wrap(from_fn(request_id))
                .app_data(in_memory_state())
                .configure(configure),
        )
        .await;

        let register = test::TestRequest::put()
            .uri("/api/tenants/7")
            .set_json(json!({ "name": "Aguas del Norte" }))
            .to_request();
        let response = test::call_service(&app, register).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        for expected in 1..=3 {
            let request = test::TestRequest::post()
                .uri("/api/tenants/7/sequences/invoice/next?year=2025")
                .to_request();
            let body: NextValueResponse = test::call_and_read_body_json(&app, request).await;
            assert_eq!(body.value, expected);
            assert_eq!(body.category, SequenceCategory::Invoice);
            assert_eq!(body.reference, format!("FAC-7-2025-{:06}", expected));
        }

        let request = test::TestRequest::post()
            .uri("/api/tenants/7/sequences/DISCHARGE/next?year=2025")
            .to_request();
        let body: NextValueResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body.value, 1);
        assert_eq!(body.reference, "VT-2025-0001");

        let request = test::TestRequest::get()
            .uri("/api/tenants/7/sequences/invoice?year=2025")
            .to_request();
        let body: PeekResponse = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body.next_value, 4);
    }

    #[actix_web::test]
    async fn test_unknown_tenant_is_a_bad_request() {
        let app = test::init_service(
            App::new().app_data(in_memory_state()).configure(configure),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/api/tenants/404/sequences/invoice/next?year=2025")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: ErrorResponse = test::read_body_json(response).await;
        assert_eq!(body.error, "Tenant not found: 404");
    }

    #[actix_web::test]
    async fn test_invalid_category_and_year() {
        let state = in_memory_state();
        state
            .tenants
            .register_tenant(Tenant { id: TenantId(1), name: "Uno".to_string() })
            .unwrap();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let request = test::TestRequest::post()
            .uri("/api/tenants/1/sequences/tariff/next?year=2025")
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::post()
            .uri("/api/tenants/1/sequences/invoice/next?year=0")
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_get_tenant() {
        let app = test::init_service(
            App::new().app_data(in_memory_state()).configure(configure),
        )
        .await;

        let request = test::TestRequest::get().uri("/api/tenants/5").to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::NOT_FOUND);

        let request = test::TestRequest::put()
            .uri("/api/tenants/5")
            .set_json(json!({ "name": "  " }))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);

        let request = test::TestRequest::put()
            .uri("/api/tenants/5")
            .set_json(json!({ "name": "Cinco" }))
            .to_request();
        test::call_service(&app, request).await;

        let request = test::TestRequest::get().uri("/api/tenants/5").to_request();
        let tenant: Tenant = test::call_and_read_body_json(&app, request).await;
        assert_eq!(tenant.name, "Cinco");
    }

    #[actix_web::test]
    async fn test_metrics_endpoint() {
        let state = in_memory_state();
        state
            .tenants
            .register_tenant(Tenant { id: TenantId(3), name: "Tres".to_string() })
            .unwrap();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let request = test::TestRequest::post()
            .uri("/api/tenants/3/sequences/discharge/next?year=2024")
            .to_request();
        test::call_service(&app, request).await;

        let request = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, request).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("sequence_values_issued_total{category=\"DISCHARGE\"} 1"));
        assert!(text.contains("sequence_counters_created_total{category=\"DISCHARGE\"} 1"));
    }

    #[actix_web::test]
    async fn test_resolve_year_defaults_to_current() {
        assert_eq!(resolve_year(None).unwrap(), chrono::Utc::now().year());
        assert!(matches!(resolve_year(Some(10_000)), Err(ApiError::InvalidYear(10_000))));
    }
}
