//! Runtime configuration, parsed once at startup from command-line
//! arguments with environment-variable fallbacks.

pub mod config;
