pub mod config;
#[cfg(feature = "session-backend")]
pub mod logparse;
