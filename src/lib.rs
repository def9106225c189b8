#![forbid(unsafe_code)]

pub mod autosave;
pub mod background;
pub mod chapters;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod optimistic;
pub mod pagination;
pub mod prefs;
pub mod publish;
pub mod reader;
pub mod readiness;
pub mod service;
pub mod session;
