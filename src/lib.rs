pub mod analysis;
pub mod annotations;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod manifest;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod usage;
pub mod util;
