//! # tmplhub-domain
//!
//! Pure domain model for the tmplhub blueprint-driven template entity engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Entities** (state snapshots read and written on the state bus)
//! - Define **Documents** (decoded configuration trees with input placeholders)
//! - Validate documents against declarative **Schemas**
//! - Define **Blueprints** (parameterised configuration) and their instantiation
//! - Compile and render **Templates**, and resolve their static dependencies
//! - Define **Template entities** (binary sensors / sensors computed from templates)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod blueprint;
pub mod document;
pub mod entity;
pub mod event;
pub mod schema;
pub mod template;
pub mod template_entity;
