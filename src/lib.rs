//! Starchain - a hash-linked star registry ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, hash linking, the append-only ledger and its validation
//! - [`star`] - Star record types and schema validation
//!
//! ## Identity & Admission
//! - [`identity`] - Time-windowed identity challenges
//! - [`registry`] - Admission gate: verified identity in, one block out
//!
//! ## Cryptography
//! - [`crypto`] - Key pairs and recoverable signatures (secp256k1)
//!
//! ## State Management
//! - [`persistence`] - Key-value stores (SQLite, in-memory)
//! - [`clock`] - Time sources
//!
//! ## Integration
//! - [`api`] - REST API (feature `api`)
//! - [`node`] - Bootstrap from configuration
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod star;

// ============================================================================
// Identity & Admission
// ============================================================================
pub mod identity;
pub mod registry;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod clock;
pub mod persistence;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
