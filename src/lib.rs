// Multistream Control Library
// Output profiles, destination failover and the Restreamer API client

pub mod models;
pub mod services;
