//! alphamint: an event-driven equity backtest kernel.
//!
//! Market events flow through a single-threaded [`domain::event_bus::EventBus`] into a
//! strategy, a portfolio/risk manager with T+1 settlement, and an execution router for
//! domestic and cross-border listings. Ports and adapters load bars, signals and
//! configuration and write reports around that core.

pub mod cli;
pub mod domain;
pub mod ports;
pub mod adapters;
pub mod telemetry;
