//! Time-redistribution and undo engine for worklog reconciliation.
//!
//! The crate is organised the hexagonal way:
//!
//! - [`domain`] holds the pure engine components (distribution, per-record
//!   history, action ledger, intensity classifier), the outbound ports for the
//!   collaborators the engine talks to, and the service that wires them.
//! - [`adapters`] holds in-process implementations of those ports.
//! - [`config`] holds the engine settings.

pub mod adapters;
pub mod config;
pub mod domain;
