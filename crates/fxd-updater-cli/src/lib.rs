//! CLI library components for the FXdownloader updater.

#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod logging;
