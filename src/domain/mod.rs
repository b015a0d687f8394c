//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod config;
pub mod config_validation;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod execution;
pub mod feed;
pub mod market;
pub mod metrics;
pub mod portfolio;
pub mod position;
pub mod risk;
pub mod strategy;
