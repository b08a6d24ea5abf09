//! # tmplhub-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `StateBus`: read, subscribe to and publish entity states
//!   - `BlueprintSource`: load and list raw blueprint documents
//!   - `Integration`: setup/teardown lifecycle of an integration
//! - Provide **in-process infrastructure** that doesn't need IO:
//!   - `InMemoryStateBus`: the state bus, with per-entity listener fan-out
//!   - `BlueprintStore`: per-domain, single-flight blueprint cache
//!   - `TemplateRuntime`: reactive recomputation of template entities
//! - Orchestrate domain objects (`TemplateIntegration`) without knowing
//!   *where* blueprints are stored
//!
//! ## Dependency rule
//! Depends on `tmplhub-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod blueprint_store;
pub mod ports;
pub mod runtime;
pub mod state_bus;
pub mod template_integration;
