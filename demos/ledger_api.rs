//! Ledger API backed by in-memory query services.
//!
//! Run with:
//!   LEDGER__LOG__FORMAT=text cargo run --example ledger_api
//!
//! Enable token validation by configuring the `auth` section, e.g.:
//!   LEDGER__AUTH__SECRET=dev LEDGER__AUTH__ISSUER=https://issuer.dev/ \
//!   LEDGER__AUTH__AUDIENCE=ledger-api cargo run --example ledger_api
//!
//! Try:
//!   curl http://localhost:8080/v2/healthcheck/ping
//!   curl -H 'authorization: Bearer <jwt>' http://localhost:8080/v2/ledgers

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ledger_api::api::{self, Services};
use ledger_api::auth::{Authenticate, Hs256Validator};
use ledger_api::config::AppConfig;
use ledger_api::ledgers::{CreateLedger, LedgerDto, LedgerQueries, UserLedgersQuery};
use ledger_api::middleware::Cors;
use ledger_api::transactions::{SummaryDto, SummaryQuery, TransactionQueries};
use ledger_api::{ApiError, RequestContext, Router, Server, logging};

#[derive(Default)]
struct InMemoryLedgers {
    ledgers: Mutex<Vec<LedgerDto>>,
}

#[async_trait]
impl LedgerQueries for InMemoryLedgers {
    async fn process_user_ledgers_query(
        &self,
        _ctx: &RequestContext,
        _query: &UserLedgersQuery,
    ) -> Result<Vec<LedgerDto>, ApiError> {
        let ledgers = self.ledgers.lock().map_err(|e| ApiError::internal(e.to_string()))?;
        Ok(ledgers.clone())
    }

    async fn process_create_ledger_command(
        &self,
        _ctx: &RequestContext,
        command: &CreateLedger,
    ) -> Result<LedgerDto, ApiError> {
        let mut ledgers = self.ledgers.lock().map_err(|e| ApiError::internal(e.to_string()))?;
        let ledger = LedgerDto {
            ledger_id: uuid::Uuid::new_v4().to_string(),
            name: command.name.clone(),
            currency_code: command.currency_code.clone(),
        };
        ledgers.push(ledger.clone());
        Ok(ledger)
    }
}

struct EmptySummaries;

#[async_trait]
impl TransactionQueries for EmptySummaries {
    async fn process_summary_query(
        &self,
        ctx: &RequestContext,
        query: &SummaryQuery,
    ) -> Result<Vec<SummaryDto>, ApiError> {
        if ctx.is_cancelled() {
            return Err(ApiError::internal("request cancelled"));
        }
        tracing::debug!(ledger_id = %query.ledger_id, kind = %query.kind, "summary requested");
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() -> Result<(), ledger_api::Error> {
    let cfg = AppConfig::load()?;
    logging::init(&cfg.log)?;

    let services = Services {
        ledgers: Arc::new(InMemoryLedgers::default()),
        transactions: Arc::new(EmptySummaries),
    };

    let mut router = Router::with_config(cfg.router_config()).middleware(Cors::new());
    match &cfg.auth {
        Some(auth) => {
            router = router.middleware(Authenticate::new(Hs256Validator::new(
                &auth.secret,
                &auth.issuer,
                &auth.audience,
            )));
        }
        None => tracing::warn!("no auth configured, every request is anonymous"),
    }
    let app = api::routes(router, &services).build();

    Server::bind(&cfg.server.addr())?
        .max_body_bytes(cfg.server.max_body_bytes)
        .serve(app)
        .await
}
