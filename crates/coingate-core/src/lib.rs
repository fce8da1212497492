//! Core domain + application logic for the coin-gated Telegram bot.
//!
//! This crate is framework-agnostic. Telegram and QR rendering live behind
//! ports (traits) implemented in adapter crates.

pub mod bot;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod gate;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod purchase;
pub mod utils;

pub use errors::{Error, Result};
