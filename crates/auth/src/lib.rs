//! Authentication core for the Inkwell forum backend.
//!
//! Issues and verifies stateless session tokens signed with Ed25519, and
//! stores the rotating signing keys behind them on the local filesystem or
//! in cloud object storage.
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and HTTP status mapping
//! - [`jwks`]: JWK export of public verification keys
//! - [`key_store`]: Key record repository contract and its two backends
//! - [`logging`]: Logger initialization for binaries
//! - [`rotation`]: Key generation, rotation and retirement
//! - [`session_token`]: Session token encoding and verification
//! - [`settings`]: Configuration management and validation
//! - [`test_support`]: Testing utilities

pub mod error;
pub mod jwks;
pub mod key_store;
pub mod logging;
pub mod rotation;
pub mod session_token;
pub mod settings;
