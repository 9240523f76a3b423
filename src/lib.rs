//! Event-driven electric-vehicle fleet charging simulator.
//!
//! The library's entry point is [`scenario::Scenario::run`]: build a
//! [`Scenario`](scenario::Scenario) (by hand, or via
//! [`config::ScenarioDocument::build`] from a parsed scenario document)
//! and call `run` to obtain a [`report::Summary`] plus the per-interval
//! [`report::StepRecord`] rows collected in `Scenario::records`.
//!
//! Scenario generation and file I/O around the core loop live in
//! [`config`] and [`report`]/[`timeseries`]; the core itself
//! (`scenario`, `world`, `strategy`, `components`, `battery`, `curve`,
//! `events`) has no knowledge of file formats or the CLI.

pub mod battery;
pub mod cli;
pub mod components;
pub mod config;
pub mod curve;
pub mod error;
pub mod events;
pub mod report;
pub mod scenario;
pub mod strategy;
pub mod timeseries;
pub mod world;
