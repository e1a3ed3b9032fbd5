//! Headless wallet client for the Sepolia vault/reward demo contracts.
//!
//! One signing identity per device, one active RPC endpoint chosen from an
//! ordered candidate list, and a small fixed contract surface: an ERC20
//! test token with a faucet `mint`, a deposit vault, and an epoch-based
//! reward pool.

pub mod chain;
pub mod config;
pub mod error;
pub mod identity;
pub mod orchestrator;
