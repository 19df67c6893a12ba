//! CLI command implementations

pub mod cards;
pub mod error;
pub mod extract;

pub use cards::CardsArgs;
pub use error::CliError;
pub use extract::{Cli, Commands, ExtractArgs, OutputFormat, SinkFormat};
