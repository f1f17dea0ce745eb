// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// block/ledger management (`chain`) and integrity checks (`validation`).

pub mod core;
pub use core::*;
