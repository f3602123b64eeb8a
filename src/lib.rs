//! Lazy directory tree browser with key/BPM enrichment for audio files.
//!
//! The engine lives in [`fs`]: [`fs::expander::Expander`] owns the tree and
//! is the only entry point the terminal front end talks to.

pub mod app;
pub mod components;
pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod handler;
pub mod logging;
pub mod tags;
pub mod tui;
pub mod ui;
