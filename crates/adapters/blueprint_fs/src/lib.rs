//! # tmplhub-adapter-blueprint-fs
//!
//! Blueprint source adapters.
//!
//! ## Responsibilities
//! - Implement the `BlueprintSource` port defined in `tmplhub-app::ports`
//! - Read blueprints from a directory tree (`<root>/<domain>/<path>`)
//! - Ship the builtin blueprints embedded in the binary
//! - Decode `.toml` and `.json` files into domain documents
//!
//! ## Dependency rule
//! Depends on `tmplhub-app` (for port traits) and `tmplhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod builtin;
mod decode;
mod error;
mod fs;
mod layered;

pub use builtin::BuiltinBlueprintSource;
pub use decode::decode;
pub use error::SourceError;
pub use fs::FsBlueprintSource;
pub use layered::LayeredSource;
