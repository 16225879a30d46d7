#![warn(clippy::unwrap_used)]
#![doc = include_str!("../README.md")]

pub mod amount;
pub mod dedup;
pub mod error;
pub mod execution;
pub mod export;
pub mod extract;
pub mod ledger;
pub mod logging;
pub mod ofx;
pub mod reconcile;
pub mod rollup;
pub mod sales;
pub mod store;

pub use error::{Error, Result};
pub use reconcile::{BatchResult, ManualEntry, Reconciler, UndoResult};
pub use store::StoreConfig;
