//! Randomized in-day presence monitoring and the payment workflow that turns
//! a verified working day into a wage transfer.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
