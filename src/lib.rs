//! Run small interactive scripts against a console: output is captured into
//! a transcript, `prompt` asks the human at the terminal, and starting a new
//! run supersedes the old one.

pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod printer;
pub mod script;
pub mod tui;
pub mod utils;
