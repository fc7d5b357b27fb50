//! Matching engine facade.
//!
//! Owns a handle to the order store and runs each match in its own transaction, so the fill of
//! both sides and any residual order commit together or not at all.

use crate::error::EngineError;
use crate::matching::{match_order, MatchOutcome};
use crate::repository::OrderRepository;
use crate::types::OrderId;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;

/// Matches persisted incoming orders against the resting book.
///
/// Never retries: a lost race comes back as [`EngineError::Conflict`] with nothing written,
/// and the caller decides whether to try again.
#[derive(Clone)]
pub struct MatchingEngine {
    repo: Arc<dyn OrderRepository>,
}

impl MatchingEngine {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    /// Matches order `order_id`, stamping fills with the current time.
    pub fn match_order(&self, order_id: OrderId) -> Result<MatchOutcome, EngineError> {
        self.match_order_at(order_id, Utc::now())
    }

    /// Matches order `order_id`, stamping fills with `now`.
    pub fn match_order_at(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, EngineError> {
        let mut tx = self.repo.begin()?;
        let outcome = match_order(tx.as_mut(), order_id, now)?;
        tx.commit()?;
        match outcome {
            MatchOutcome::NoMatch => {
                info!("order resting order_id={}", order_id);
            }
            MatchOutcome::Matched { counterparty, child } => {
                info!(
                    "trade order_id={} counterparty_id={} child_id={:?}",
                    order_id, counterparty, child
                );
            }
            MatchOutcome::AlreadyFilled { counterparty } => {
                debug!(
                    "order already filled order_id={} counterparty_id={:?}",
                    order_id, counterparty
                );
            }
        }
        Ok(outcome)
    }
}
