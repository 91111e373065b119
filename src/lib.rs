//! Behaviour-driven scenario testing for processes on an embedded workflow
//! engine.
//!
//! `procspec` lets a test describe a process run as Given/When/Then stages:
//! preconditions are recorded, actions are sent to the engine, and
//! assertions read the engine's runtime and history back. Between actions
//! the engine's asynchronous job queue is drained, and the engine clock can
//! be moved so that timers fire on demand.
//!
//! # Architecture
//!
//! The engine is reached only through the traits in [`engine`], one per
//! engine area, so scenarios run unchanged against any client that
//! implements [`engine::EngineClient`]. An in-memory engine
//! ([`engine::memory::InMemoryEngine`]) ships with the crate for fast tests.
//!
//! # Modules
//!
//! - [`config`]: Scenario configuration with layered precedence (env > file > defaults)
//! - [`engine`]: Engine client traits, domain records, and the in-memory engine
//! - [`scenario`]: The Given/When/Then stages and the state they share
//! - [`jobs`]: Job draining and the background scheduling pool
//! - [`clock`]: Virtual clock control with optional drain
//! - [`error`]: Semantic error types

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod scenario;
