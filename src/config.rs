//! Runtime configuration, read from the environment.
//!
//! | variable | default | meaning |
//! |---|---|---|
//! | `PORT` | `5002` | HTTP listen port |
//! | `ORDERS_DB` | `orders.json` | order snapshot file; empty keeps orders in memory only |
//! | `REJECTION_LOG` | `server_log.txt` | rejection log file; empty writes to stdout |
//! | `MAX_MATCH_ATTEMPTS` | `3` | match attempts before a racing order rests |
//! | `MAX_TRANSIENT_RETRIES` | `3` | retries of transient store errors |

use crate::intake::IntakeConfig;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub orders_path: Option<PathBuf>,
    pub rejection_log_path: Option<PathBuf>,
    pub intake: IntakeConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = IntakeConfig::default();
        let path = |key: &str, default: &str| {
            let value = lookup(key).unwrap_or_else(|| default.to_string());
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            }
        };
        Self {
            port: lookup("PORT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(5002),
            orders_path: path("ORDERS_DB", "orders.json"),
            rejection_log_path: path("REJECTION_LOG", "server_log.txt"),
            intake: IntakeConfig {
                max_match_attempts: lookup("MAX_MATCH_ATTEMPTS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.max_match_attempts),
                max_transient_retries: lookup("MAX_TRANSIENT_RETRIES")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.max_transient_retries),
            },
        }
    }
}
