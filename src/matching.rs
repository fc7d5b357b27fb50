//! Cross-rate matching of one incoming order against the resting book.
//!
//! [`match_order`] runs inside a caller-owned transaction: it reads the reverse-pair candidates,
//! takes the **first** candidate (in insertion order) whose rate satisfies the incoming order,
//! fills both sides and inserts at most one residual order. The best-rate candidate is not
//! searched for; first-acceptable is the book's trade policy.
//!
//! Amounts are exact rationals, so the predicate and residual rates never round.

use crate::amount::Amount;
use crate::error::EngineError;
use crate::repository::{FillUpdate, OrderTransaction};
use crate::types::{NewOrder, Order, OrderId};
use chrono::{DateTime, Utc};

/// What happened to the incoming order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOutcome {
    /// No acceptable counter-order; the incoming order rests.
    NoMatch,
    /// Traded against `counterparty`. `child` is the residual order, if one was created.
    Matched {
        counterparty: OrderId,
        child: Option<OrderId>,
    },
    /// A concurrent incoming order already took this order off the book.
    AlreadyFilled { counterparty: Option<OrderId> },
}

/// Cross-rate predicate: `existing` offers at least the rate `incoming` asks for.
///
/// `existing.sell * incoming.sell >= incoming.buy * existing.buy`
pub fn crosses(existing: &Order, incoming: &Order) -> bool {
    &existing.sell_amount * &incoming.sell_amount >= &incoming.buy_amount * &existing.buy_amount
}

/// First candidate, in the given order, that crosses `incoming`.
pub fn find_candidate<'a>(candidates: &'a [Order], incoming: &Order) -> Option<&'a Order> {
    candidates.iter().find(|candidate| crosses(candidate, incoming))
}

/// Residual order left by trading `existing` against `incoming`, if either side over-offered.
pub fn residual(existing: &Order, incoming: &Order) -> Result<Option<NewOrder>, EngineError> {
    if existing.buy_amount > incoming.sell_amount {
        child_of(existing, &existing.buy_amount - &incoming.sell_amount).map(Some)
    } else if incoming.buy_amount > existing.sell_amount {
        child_of(incoming, &incoming.buy_amount - &existing.sell_amount).map(Some)
    } else {
        Ok(None)
    }
}

/// Remainder of `parent` wanting `buy_amount` more, at exactly the parent's rate.
fn child_of(parent: &Order, buy_amount: Amount) -> Result<NewOrder, EngineError> {
    let sell_amount = (&parent.sell_amount * &buy_amount)
        .checked_div(&parent.buy_amount)
        .ok_or_else(|| {
            EngineError::Arithmetic(format!("order {} has a zero buy amount", parent.id))
        })?;
    Ok(NewOrder {
        sender_pk: parent.sender_pk.clone(),
        receiver_pk: parent.receiver_pk.clone(),
        buy_currency: parent.buy_currency.clone(),
        sell_currency: parent.sell_currency.clone(),
        buy_amount,
        sell_amount,
        signature: None,
        platform: None,
        creator_id: Some(parent.id),
    })
}

/// Match the persisted order `incoming_id` against the book inside `tx`.
///
/// Does not commit. Returns [`EngineError::Conflict`] if a fill update loses a race; the
/// caller must drop the transaction so every write of this attempt is rolled back.
pub fn match_order(
    tx: &mut dyn OrderTransaction,
    incoming_id: OrderId,
    now: DateTime<Utc>,
) -> Result<MatchOutcome, EngineError> {
    let incoming = tx.get(incoming_id)?;
    if incoming.is_filled() {
        return Ok(MatchOutcome::AlreadyFilled {
            counterparty: incoming.counterparty_id,
        });
    }

    let candidates = tx.query_unfilled_by_pair(&incoming.sell_currency, &incoming.buy_currency)?;
    let Some(existing) = find_candidate(&candidates, &incoming) else {
        return Ok(MatchOutcome::NoMatch);
    };

    for (id, counterparty) in [(existing.id, incoming.id), (incoming.id, existing.id)] {
        if tx.update_fill_atomic(id, counterparty, now)? == FillUpdate::Conflict {
            return Err(EngineError::Conflict(id));
        }
    }

    let child = match residual(existing, &incoming)? {
        Some(order) => Some(tx.insert(order)?),
        None => None,
    };
    Ok(MatchOutcome::Matched {
        counterparty: existing.id,
        child,
    })
}
