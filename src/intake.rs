//! Order intake: shape and amount validation, signature check, persistence, then matching.
//!
//! Business rejections are logged to the [`RejectionLog`] and reported as `Ok(false)`. Only
//! store failures come back as `Err`, so callers can tell an invalid order from a failing
//! system.

use crate::amount::Amount;
use crate::engine::MatchingEngine;
use crate::error::{EngineError, IntakeError, Rejection, RepositoryError};
use crate::matching::MatchOutcome;
use crate::rejection_log::{RejectionLog, RejectionRecord};
use crate::repository::OrderRepository;
use crate::signature::{parse_platform, verify};
use crate::types::{NewOrder, OrderId, Platform};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Top-level request fields.
pub const REQUIRED_FIELDS: [&str; 2] = ["sig", "payload"];

/// Fields every payload must carry.
pub const REQUIRED_PAYLOAD_FIELDS: [&str; 7] = [
    "sender_pk",
    "receiver_pk",
    "buy_currency",
    "sell_currency",
    "buy_amount",
    "sell_amount",
    "platform",
];

/// Retry bounds for store failures the intake absorbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntakeConfig {
    /// Match attempts before an order that keeps losing fill races is left resting.
    pub max_match_attempts: u32,
    /// Retries of a [`RepositoryError::Transient`] per store operation.
    pub max_transient_retries: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_match_attempts: 3,
            max_transient_retries: 3,
        }
    }
}

/// A request that passed shape and amount checks but not yet the signature check.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub payload: Value,
    pub signature: String,
    pub platform: String,
    pub order: NewOrder,
}

/// Checks request shape and amount invariants and builds the unfilled order.
pub fn validate(raw: &Value) -> Result<Submission, Rejection> {
    let request = raw
        .as_object()
        .ok_or_else(|| Rejection::Shape("request is not a JSON object".into()))?;
    for field in REQUIRED_FIELDS {
        if !request.contains_key(field) {
            return Err(Rejection::Shape(format!("{} not received", field)));
        }
    }
    let payload = request["payload"]
        .as_object()
        .ok_or_else(|| Rejection::Shape("payload is not an object".into()))?;
    for field in REQUIRED_PAYLOAD_FIELDS {
        if !payload.contains_key(field) {
            return Err(Rejection::Shape(format!("{} not received", field)));
        }
    }

    let signature = string_field(request, "sig")?;
    let sender_pk = string_field(payload, "sender_pk")?;
    let receiver_pk = string_field(payload, "receiver_pk")?;
    let buy_currency = string_field(payload, "buy_currency")?;
    let sell_currency = string_field(payload, "sell_currency")?;
    let platform = string_field(payload, "platform")?;
    let buy_amount = parse_amount("buy_amount", &payload["buy_amount"])?;
    let sell_amount = parse_amount("sell_amount", &payload["sell_amount"])?;

    if buy_currency.is_empty() || sell_currency.is_empty() {
        return Err(Rejection::Invariant("currencies must not be empty".into()));
    }
    if buy_currency == sell_currency {
        return Err(Rejection::Invariant(format!(
            "buy_currency and sell_currency are both {}",
            buy_currency
        )));
    }

    Ok(Submission {
        payload: Value::Object(payload.clone()),
        signature: signature.clone(),
        platform,
        order: NewOrder {
            sender_pk,
            receiver_pk,
            buy_currency,
            sell_currency,
            buy_amount,
            sell_amount,
            signature: Some(signature),
            platform: None,
            creator_id: None,
        },
    })
}

fn string_field(map: &Map<String, Value>, name: &str) -> Result<String, Rejection> {
    map.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Rejection::Shape(format!("{} must be a string", name)))
}

/// Parses a JSON number or numeric string exactly and checks it is a usable amount.
fn parse_amount(name: &str, value: &Value) -> Result<Amount, Rejection> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(Rejection::Shape(format!("{} must be a number", name))),
    };
    let amount: Amount = text
        .parse()
        .map_err(|_| Rejection::Invariant(format!("{} is not an amount: {}", name, text.trim())))?;
    if !amount.is_positive() {
        return Err(Rejection::Invariant(format!(
            "{} must be positive, got {}",
            name, amount
        )));
    }
    Ok(amount)
}

/// Verifies the submission's signature; returns the signing platform on success.
pub fn check_signature(submission: &Submission) -> Result<Platform, Rejection> {
    let platform = parse_platform(&submission.platform)?;
    let valid = verify(
        &submission.payload,
        &submission.signature,
        platform,
        &submission.order.sender_pk,
    )?;
    if valid {
        Ok(platform)
    } else {
        Err(Rejection::Signature(format!(
            "signature does not belong to sender_pk {}",
            submission.order.sender_pk
        )))
    }
}

/// Entry point for submitted orders.
pub struct OrderIntake {
    repo: Arc<dyn OrderRepository>,
    engine: MatchingEngine,
    rejections: Arc<dyn RejectionLog>,
    config: IntakeConfig,
}

impl OrderIntake {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        rejections: Arc<dyn RejectionLog>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            engine: MatchingEngine::new(Arc::clone(&repo)),
            repo,
            rejections,
            config,
        }
    }

    pub fn repository(&self) -> &dyn OrderRepository {
        self.repo.as_ref()
    }

    /// Admits a raw request body. A body that is not JSON is rejected like a malformed request.
    pub fn admit_bytes(&self, body: &[u8]) -> Result<bool, IntakeError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(raw) => self.admit(&raw),
            Err(e) => {
                let content = Value::String(String::from_utf8_lossy(body).into_owned());
                self.reject(&Rejection::Shape(format!("body is not JSON: {}", e)), content);
                Ok(false)
            }
        }
    }

    /// Validates, verifies, persists and matches one submitted order.
    ///
    /// `Ok(true)` means the order was persisted, whether it traded or rests.
    pub fn admit(&self, raw: &Value) -> Result<bool, IntakeError> {
        let submission = match validate(raw) {
            Ok(submission) => submission,
            Err(rejection) => {
                self.reject(&rejection, raw.clone());
                return Ok(false);
            }
        };
        let platform = match check_signature(&submission) {
            Ok(platform) => platform,
            Err(rejection) => {
                self.reject(&rejection, submission.payload);
                return Ok(false);
            }
        };

        let mut order = submission.order;
        order.platform = Some(platform);
        let id = self.retry_transient("insert", || {
            let mut tx = self.repo.begin()?;
            let id = tx.insert(order.clone())?;
            tx.commit()?;
            Ok(id)
        })?;
        info!(
            "order admitted order_id={} platform={:?} buy={} {} sell={} {}",
            id, platform, order.buy_amount, order.buy_currency, order.sell_amount, order.sell_currency
        );

        self.match_with_retries(id)?;
        Ok(true)
    }

    fn reject(&self, rejection: &Rejection, content: Value) {
        warn!("order rejected kind={} reason={}", rejection.kind(), rejection);
        self.rejections.log(&RejectionRecord::now(rejection, content));
    }

    fn retry_transient<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut retries = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && retries < self.config.max_transient_retries => {
                    retries += 1;
                    warn!("{} retrying attempt={} error={}", operation, retries, e);
                }
                result => return result,
            }
        }
    }

    /// Runs the engine until it settles. Lost races are retried with a fresh candidate query;
    /// after `max_match_attempts` the order is left resting.
    fn match_with_retries(&self, id: OrderId) -> Result<MatchOutcome, IntakeError> {
        let max_attempts = self.config.max_match_attempts.max(1);
        let mut attempts = 0;
        let mut transient = 0;
        loop {
            match self.engine.match_order(id) {
                Ok(outcome) => return Ok(outcome),
                Err(EngineError::Conflict(taken)) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        warn!(
                            "order left resting after lost fill races order_id={} attempts={}",
                            id, attempts
                        );
                        return Ok(MatchOutcome::NoMatch);
                    }
                    debug!("fill race lost order_id={} taken={} attempt={}", id, taken, attempts);
                }
                Err(EngineError::Repository(e))
                    if e.is_transient() && transient < self.config.max_transient_retries =>
                {
                    transient += 1;
                    warn!("match retrying attempt={} error={}", transient, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
