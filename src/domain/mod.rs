//! Domain layer: value objects, entities, the pure planning and scoring
//! functions, and the ports the application layer talks through.

pub mod account;
pub mod attendance;
pub mod monitoring;
pub mod payment;
pub mod planner;
pub mod ports;
pub mod schedule;
pub mod score;
pub mod worker;
