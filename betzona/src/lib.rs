//! # Betzona
//!
//! Core library of the Betzona sports-betting backend.
//!
//! The crate is built around a small number of managers that receive their
//! persistence handles at construction time. There is no global database
//! handle: every manager is handed `Arc<dyn Repository>` values, so the same
//! logic runs against PostgreSQL in production and against [`db::MemoryStore`]
//! in tests and local demos.
//!
//! ## Core Modules
//!
//! - [`ledger`]: Bet placement and cancellation with atomic balance updates
//! - [`fixtures`]: Match read model and match administration
//! - [`auth`]: Registration, login, JWT issue and identity resolution
//! - [`db`]: Connection pool, migrations, repository traits and implementations
//!
//! ## Example
//!
//! ```
//! use betzona::db::MemoryStore;
//! use betzona::ledger::BetManager;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let bets = BetManager::new(store.clone(), store);
//! # let _ = bets;
//! ```

pub mod auth;
pub mod db;
pub mod fixtures;
pub mod ledger;
pub mod pagination;

pub use pagination::{Page, Pagination};
