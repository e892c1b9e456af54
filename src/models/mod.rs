// Data models

mod connection;
mod destination;
mod encoding;
mod process;
mod profile;
mod settings;

pub use connection::*;
pub use destination::*;
pub use encoding::*;
pub use process::*;
pub use profile::*;
pub use settings::*;
