//! Harvests PhET interactive simulations and packages them, per language,
//! into portable offline archives with a browsable index page.

pub mod app;
pub mod assets;
pub mod catalog;
pub mod config;
pub mod container;
pub mod domain;
pub mod error;
pub mod export;
pub mod fallback;
pub mod fetch;
pub mod languages;
pub mod locale;
pub mod pool;
pub mod progress;
pub mod source;
pub mod store;
pub mod taxonomy;
pub mod transform;
