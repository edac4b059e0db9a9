#![allow(dead_code, unused_imports, unused_variables)]
//! Countdown Trader - Threshold Countdown Entry/Exit Decision Engine
//!
//! A rule-based decision engine that tracks, per ticker, a buy target or a
//! held position, each carrying a countdown that must reach zero before the
//! buy or sell is confirmed - unless the price crosses a more extreme
//! threshold that triggers the action immediately.
//!
//! # Modules
//!
//! - `domain`: Pure decision logic (ThresholdPolicy, MarketAgeGate)
//! - `store`: Countdown record persistence contract and backends
//! - `engine`: BuyEvaluator and SellEvaluator state machines
//! - `application`: Replay driver and caller-side transitions
//! - `config`: Configuration loading and validation

pub mod application;
pub mod config;
pub mod domain;
pub mod engine;
pub mod store;
