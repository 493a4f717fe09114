//! Ledger routes.
//!
//! | Route              | Scope           | Result                     |
//! |--------------------|-----------------|----------------------------|
//! | `GET /v2/ledgers`  | `read:ledgers`  | 200, ledgers of the caller |
//! | `POST /v2/ledgers` | `write:ledgers` | 201, the created ledger    |

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::authorize;
use crate::context::RequestContext;
use crate::http_error::ApiError;
use crate::request::Request;
use crate::response::Json;
use crate::router::Router;
use crate::validation::Validated;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LedgerDto {
    #[serde(rename = "ledgerID")]
    pub ledger_id: String,
    pub name: String,
    #[serde(rename = "currencyCode")]
    pub currency_code: String,
}

/// Ledgers visible to the caller.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserLedgersQuery {
    /// `sub` claim of the caller.
    pub subject: Option<String>,
}

/// Body of `POST /v2/ledgers`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, garde::Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateLedger {
    #[garde(length(min = 1))]
    pub name: String,
    /// ISO 4217 code.
    #[garde(length(min = 3, max = 3))]
    pub currency_code: String,
}

impl Validated for CreateLedger {
    const FIELDS: &'static [&'static str] = &["name", "currency_code"];
}

#[async_trait]
pub trait LedgerQueries: Send + Sync + 'static {
    async fn process_user_ledgers_query(
        &self,
        ctx: &RequestContext,
        query: &UserLedgersQuery,
    ) -> Result<Vec<LedgerDto>, ApiError>;

    async fn process_create_ledger_command(
        &self,
        ctx: &RequestContext,
        command: &CreateLedger,
    ) -> Result<LedgerDto, ApiError>;
}

async fn list_ledgers(
    queries: Arc<dyn LedgerQueries>,
    req: Request,
) -> Result<Json<Vec<LedgerDto>>, ApiError> {
    let query = UserLedgersQuery {
        subject: req.context().claims().map(|claims| claims.subject.clone()),
    };
    let ledgers = queries.process_user_ledgers_query(req.context(), &query).await?;
    Ok(Json(ledgers))
}

async fn create_ledger(
    queries: Arc<dyn LedgerQueries>,
    req: Request,
) -> Result<(StatusCode, Json<LedgerDto>), ApiError> {
    let command: CreateLedger = req.bind_json()?;
    let ledger = queries.process_create_ledger_command(req.context(), &command).await?;
    Ok((StatusCode::CREATED, Json(ledger)))
}

pub fn routes(router: Router, queries: Arc<dyn LedgerQueries>) -> Router {
    let list = {
        let queries = Arc::clone(&queries);
        move |req: Request| list_ledgers(Arc::clone(&queries), req)
    };
    let create = move |req: Request| create_ledger(Arc::clone(&queries), req);

    router
        .get("/v2/ledgers", authorize(list, &["read:ledgers"]))
        .post("/v2/ledgers", authorize(create, &["write:ledgers"]))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::auth::Claims;
    use crate::http_error::ErrorBody;
    use crate::middleware::from_fn;

    #[derive(Default)]
    struct InMemoryLedgers {
        ledgers: Mutex<Vec<LedgerDto>>,
        queries: Mutex<Vec<UserLedgersQuery>>,
    }

    #[async_trait]
    impl LedgerQueries for InMemoryLedgers {
        async fn process_user_ledgers_query(
            &self,
            _ctx: &RequestContext,
            query: &UserLedgersQuery,
        ) -> Result<Vec<LedgerDto>, ApiError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.ledgers.lock().unwrap().clone())
        }

        async fn process_create_ledger_command(
            &self,
            _ctx: &RequestContext,
            command: &CreateLedger,
        ) -> Result<LedgerDto, ApiError> {
            let mut ledgers = self.ledgers.lock().unwrap();
            let ledger = LedgerDto {
                ledger_id: format!("ledger-{}", ledgers.len() + 1),
                name: command.name.clone(),
                currency_code: command.currency_code.clone(),
            };
            ledgers.push(ledger.clone());
            Ok(ledger)
        }
    }

    fn app(svc: Arc<InMemoryLedgers>, scope: &'static str) -> crate::App {
        Router::new()
            .middleware(from_fn(move |mut req: Request, next| async move {
                req.context_mut().set_claims(Claims {
                    subject: "user-1".to_owned(),
                    scope: scope.to_owned(),
                    ..Claims::default()
                });
                next.run(req).await
            }))
            .routes(|router| routes(router, svc))
            .build()
    }

    fn request(method: &str, body: &'static str) -> Request {
        Request::from_http(
            http::Request::builder()
                .method(method)
                .uri("/v2/ledgers")
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
            "127.0.0.1:1",
        )
    }

    #[tokio::test]
    async fn lists_ledgers_of_the_caller() {
        let svc = Arc::new(InMemoryLedgers::default());
        svc.ledgers.lock().unwrap().push(LedgerDto {
            ledger_id: "l-1".to_owned(),
            name: "Household".to_owned(),
            currency_code: "EUR".to_owned(),
        });

        let res = app(Arc::clone(&svc), "read:ledgers").call(request("GET", "")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(
            res.body().as_ref(),
            br#"[{"ledgerID":"l-1","name":"Household","currencyCode":"EUR"}]"#
        );
        assert_eq!(
            *svc.queries.lock().unwrap(),
            vec![UserLedgersQuery { subject: Some("user-1".to_owned()) }]
        );
    }

    #[tokio::test]
    async fn creates_ledger() {
        let svc = Arc::new(InMemoryLedgers::default());
        let res = app(Arc::clone(&svc), "write:ledgers")
            .call(request("POST", r#"{"name":"Travel","currencyCode":"USD"}"#))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let created: LedgerDto = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(created.name, "Travel");
        assert_eq!(svc.ledgers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_reports_every_invalid_field() {
        let svc = Arc::new(InMemoryLedgers::default());
        let res = app(Arc::clone(&svc), "write:ledgers").call(request("POST", "{}")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

        let body: ErrorBody = serde_json::from_slice(res.body()).unwrap();
        let details: Vec<String> = body.errors.into_iter().filter_map(|e| e.detail).collect();
        assert_eq!(
            details,
            vec![
                "Field 'CreateLedger.name' validation failed on 'length' tag",
                "Field 'CreateLedger.currency_code' validation failed on 'length' tag",
            ]
        );
        assert!(svc.ledgers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_requires_write_scope() {
        let svc = Arc::new(InMemoryLedgers::default());
        let res = app(svc, "read:ledgers")
            .call(request("POST", r#"{"name":"Travel","currencyCode":"USD"}"#))
            .await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        let body: ErrorBody = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.errors[0].detail.as_deref(), Some("Missing scope: write:ledgers"));
    }
}
