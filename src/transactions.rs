//! Transaction summary route.
//!
//! `GET /v2/ledgers/:ledgerID/transactions/:type/summary` (scope
//! `read:transactions`) with optional query parameters:
//!
//! - `from`, `to`: RFC 3339 timestamps
//! - `excludeTagIDs`: comma-separated tag IDs

use std::num::ParseIntError;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::authorize;
use crate::context::RequestContext;
use crate::http_error::ApiError;
use crate::request::Request;
use crate::response::Json;
use crate::router::Router;
use crate::validation::Validated;

pub const SUMMARY_PATH: &str = "/v2/ledgers/:ledgerID/transactions/:type/summary";

/// Amount per tag.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SummaryDto {
    #[serde(rename = "tagID")]
    pub tag_id: i64,
    #[serde(rename = "tagName")]
    pub tag_name: String,
    pub amount: i64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SummaryQuery {
    pub ledger_id: String,
    /// Transaction type, e.g. `expense` or `income`.
    pub kind: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub exclude_tag_ids: Vec<i64>,
}

#[async_trait]
pub trait TransactionQueries: Send + Sync + 'static {
    async fn process_summary_query(
        &self,
        ctx: &RequestContext,
        query: &SummaryQuery,
    ) -> Result<Vec<SummaryDto>, ApiError>;
}

#[derive(Default, garde::Validate)]
struct SummaryParams {
    #[garde(length(min = 1))]
    ledger_id: String,
    #[garde(length(min = 1))]
    kind: String,
    #[garde(skip)]
    from: Option<DateTime<Utc>>,
    #[garde(skip)]
    to: Option<DateTime<Utc>>,
    #[garde(skip)]
    exclude_tag_ids: Vec<i64>,
}

impl Validated for SummaryParams {
    const FIELDS: &'static [&'static str] = &["ledger_id", "kind", "from", "to", "exclude_tag_ids"];
}

impl From<SummaryParams> for SummaryQuery {
    fn from(p: SummaryParams) -> Self {
        Self {
            ledger_id: p.ledger_id,
            kind: p.kind,
            from: p.from,
            to: p.to,
            exclude_tag_ids: p.exclude_tag_ids,
        }
    }
}

/// Empty means unbounded.
fn parse_time(raw: &str) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw).map(|t| Some(t.with_timezone(&Utc)))
}

fn parse_id_list(raw: &str) -> Result<Vec<i64>, ParseIntError> {
    raw.split(',').filter(|id| !id.is_empty()).map(str::parse).collect()
}

async fn summary(
    queries: Arc<dyn TransactionQueries>,
    req: Request,
) -> Result<Json<Vec<SummaryDto>>, ApiError> {
    let mut params = SummaryParams::default();
    req.bind_params()
        .path_param("ledgerID").string(&mut params.ledger_id)
        .path_param("type").string(&mut params.kind)
        .query_param("from").custom(&mut params.from, parse_time)
        .query_param("to").custom(&mut params.to, parse_time)
        .query_param("excludeTagIDs").custom(&mut params.exclude_tag_ids, parse_id_list)
        .validate(&params)?;

    let query = SummaryQuery::from(params);
    let result = queries.process_summary_query(req.context(), &query).await?;
    Ok(Json(result))
}

pub fn routes(router: Router, queries: Arc<dyn TransactionQueries>) -> Router {
    let handler = move |req: Request| summary(Arc::clone(&queries), req);
    router.get(SUMMARY_PATH, authorize(handler, &["read:transactions"]))
}
