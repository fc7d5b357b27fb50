//! # Signed Order Exchange
//!
//! Peer-to-peer exchange for cross-chain currency swaps. Orders are signed by the sender's
//! Ethereum or Algorand key, verified, persisted, and matched against resting orders on the
//! reverse currency pair. A partial fill spawns a child order carrying the remainder at the
//! parent's rate.
//!
//! ## Entry point
//!
//! Use [`OrderIntake`] as the single entry point: create with [`OrderIntake::new`] over an
//! [`OrderRepository`] and a [`RejectionLog`], then call [`OrderIntake::admit`] per request.
//! [`list_orders`] reads the book back.
//!
//! ## Example
//!
//! ```rust
//! use signed_order_exchange::{
//!     algorand_address, list_orders, sign_algorand, InMemoryRejectionLog, IntakeConfig,
//!     MemoryOrderRepository, OrderIntake,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let repo = Arc::new(MemoryOrderRepository::new());
//! let intake = OrderIntake::new(repo.clone(), Arc::new(InMemoryRejectionLog::new()), IntakeConfig::default());
//!
//! let key = ed25519_dalek::SigningKey::from_bytes(&[7; 32]);
//! let payload = json!({
//!     "sender_pk": algorand_address(&key.verifying_key()),
//!     "receiver_pk": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
//!     "buy_currency": "Ethereum",
//!     "sell_currency": "Algorand",
//!     "buy_amount": 2,
//!     "sell_amount": "150.5",
//!     "platform": "Algorand"
//! });
//! let sig = sign_algorand(&key, &payload).unwrap();
//! assert!(intake.admit(&json!({ "sig": sig, "payload": payload })).unwrap());
//! assert_eq!(list_orders(repo.as_ref()).unwrap().count(), 1);
//! ```
//!
//! ## Lower-level API
//!
//! [`MatchingEngine`] and [`match_order`] run matching directly against a repository, and
//! [`verify`] checks a signature without going through intake.

pub mod amount;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod matching;
pub mod order_book;
pub mod persistence;
pub mod rejection_log;
pub mod repository;
pub mod signature;
pub mod types;

pub use amount::{Amount, AmountParseError};
pub use config::Config;
pub use engine::MatchingEngine;
pub use error::{EngineError, IntakeError, PersistenceError, Rejection, RepositoryError, VerificationError};
pub use intake::{IntakeConfig, OrderIntake};
pub use matching::{match_order, MatchOutcome};
pub use order_book::list_orders;
pub use persistence::{FilePersistence, PersistedState};
pub use rejection_log::{FileRejectionLog, InMemoryRejectionLog, RejectionLog, RejectionRecord, StdoutRejectionLog};
pub use repository::{FillUpdate, MemoryOrderRepository, OrderRepository, OrderTransaction};
pub use signature::{algorand_address, ethereum_address, parse_platform, sign_algorand, sign_ethereum, verify};
pub use types::{NewOrder, Order, OrderId, OrderView, Platform};
