//! Core types for the exchange: order ids, signing platforms, and the order record.
//!
//! Identifiers are newtype wrappers. [`Order`] is the single persisted entity; [`NewOrder`]
//! is an order before the repository assigns its id.

use crate::amount::Amount;
use chrono::{DateTime, Utc};
use std::fmt;

/// Unique order identifier, assigned by the repository on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signing scheme used by the order's sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Platform {
    /// secp256k1 personal-message signature; signer address is recovered.
    Ethereum,
    /// Ed25519 signature checked directly against the sender address.
    Algorand,
}

impl Platform {
    /// Parses the wire name. Only the exact names `Ethereum` and `Algorand` are accepted.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "Ethereum" => Some(Platform::Ethereum),
            "Algorand" => Some(Platform::Algorand),
            _ => None,
        }
    }
}

/// An order that has not been persisted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub sender_pk: String,
    pub receiver_pk: String,
    pub buy_currency: String,
    pub sell_currency: String,
    pub buy_amount: Amount,
    pub sell_amount: Amount,
    /// `None` on residual orders, which nobody signed.
    pub signature: Option<String>,
    pub platform: Option<Platform>,
    /// Set only on residual orders split off a partial fill.
    pub creator_id: Option<OrderId>,
}

/// Persisted order.
///
/// `filled_at` and `counterparty_id` are set together, exactly once, by the matching engine.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub sender_pk: String,
    pub receiver_pk: String,
    pub buy_currency: String,
    pub sell_currency: String,
    pub buy_amount: Amount,
    pub sell_amount: Amount,
    pub signature: Option<String>,
    pub platform: Option<Platform>,
    pub filled_at: Option<DateTime<Utc>>,
    pub counterparty_id: Option<OrderId>,
    pub creator_id: Option<OrderId>,
}

impl Order {
    /// Builds the persisted record for `new` under `id`, unfilled.
    pub fn from_new(id: OrderId, new: NewOrder) -> Self {
        Self {
            id,
            sender_pk: new.sender_pk,
            receiver_pk: new.receiver_pk,
            buy_currency: new.buy_currency,
            sell_currency: new.sell_currency,
            buy_amount: new.buy_amount,
            sell_amount: new.sell_amount,
            signature: new.signature,
            platform: new.platform,
            filled_at: None,
            counterparty_id: None,
            creator_id: new.creator_id,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.filled_at.is_some()
    }
}

/// Public view of an order returned by the order book listing.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub sender_pk: String,
    pub receiver_pk: String,
    pub buy_currency: String,
    pub sell_currency: String,
    pub buy_amount: Amount,
    pub sell_amount: Amount,
    pub signature: Option<String>,
    pub filled_at: Option<DateTime<Utc>>,
    pub counterparty_id: Option<OrderId>,
    pub creator_id: Option<OrderId>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            sender_pk: order.sender_pk,
            receiver_pk: order.receiver_pk,
            buy_currency: order.buy_currency,
            sell_currency: order.sell_currency,
            buy_amount: order.buy_amount,
            sell_amount: order.sell_amount,
            signature: order.signature,
            filled_at: order.filled_at,
            counterparty_id: order.counterparty_id,
            creator_id: order.creator_id,
        }
    }
}
