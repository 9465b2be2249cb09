//! Chatscribe Core: domain types, errors, configuration, collaborator traits.

pub mod cancel;
pub mod config;
pub mod error;
pub mod persistence;
pub mod surface;
pub mod types;

pub use cancel::CancellationSignal;
pub use config::{BrowserSettings, ScraperConfig};
pub use error::{Error, Result};
pub use persistence::Persistence;
pub use surface::{Browser, ElementRef, Page};
pub use types::*;
