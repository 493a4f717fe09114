//! Route table of the whole API.

use std::sync::Arc;

use crate::health;
use crate::ledgers::{self, LedgerQueries};
use crate::router::Router;
use crate::transactions::{self, TransactionQueries};

/// Query services the routes delegate to.
#[derive(Clone)]
pub struct Services {
    pub ledgers: Arc<dyn LedgerQueries>,
    pub transactions: Arc<dyn TransactionQueries>,
}

/// Registers every route. Called once at startup.
pub fn routes(router: Router, services: &Services) -> Router {
    router
        .routes(health::routes)
        .routes(|r| ledgers::routes(r, Arc::clone(&services.ledgers)))
        .routes(|r| transactions::routes(r, Arc::clone(&services.transactions)))
}
