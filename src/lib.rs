// src/lib.rs
//! Gas-sponsored ChipIn actions over ERC-4337, with gas paid in USDC through a
//! permit-funded token paymaster.
pub mod account;
pub mod actions;
pub mod amount;
pub mod builder;
pub mod bundler;
pub mod chain;
pub mod cli;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gas;
pub mod orchestrator;
pub mod permit;
pub mod purchase;
pub mod rpc;
pub mod submitter;
pub mod types;
