//! Browser surface: Chromium lifecycle and DevTools Protocol pages.
//!
//! Launches (or attaches to) a Chromium instance through `chromiumoxide` and
//! exposes its tabs through the `Browser`/`Page` surface traits of
//! `chatscribe-core`.

pub mod config;
pub mod manager;
pub mod page;
pub mod types;

pub use config::{LaunchOptions, ProfileDir};
pub use manager::ChromeBrowser;
pub use page::CdpPage;
