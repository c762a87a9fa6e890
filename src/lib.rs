//! Data layer of a Rick & Morty catalog browser: cached catalog access,
//! favorites, preferences, usage telemetry and best-effort cloud sync.

pub mod app;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod cloud;
pub mod config;
pub mod favorites;
pub mod logging;
pub mod preferences;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use app::{App, CharacterDetail};
