// Multistream Control Services
// Business logic layer

mod events;
mod failover;
mod health_monitor;
mod log_manager;
pub mod orientation_filter;
mod platform_registry;
pub mod profile_control;
mod profile_manager;
mod profile_store;
mod restreamer_client;
mod settings_manager;
mod template_catalog;

pub use events::*;
pub use failover::*;
pub use health_monitor::*;
pub use log_manager::*;
pub use platform_registry::*;
pub use profile_control::EncodingUpdate;
pub use profile_manager::*;
pub use profile_store::*;
pub use restreamer_client::*;
pub use settings_manager::*;
pub use template_catalog::*;
