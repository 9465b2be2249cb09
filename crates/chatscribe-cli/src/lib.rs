//! Chatscribe command line support: logging setup and plain-text dumps of the store.

pub mod dump;
pub mod logging;
