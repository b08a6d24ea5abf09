//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod blueprint_source;
pub mod integration;
pub mod state_bus;

pub use blueprint_source::BlueprintSource;
pub use integration::{Integration, SetupReport};
pub use state_bus::{BusStates, StateBus, StateListener, SubscriptionHandle};
