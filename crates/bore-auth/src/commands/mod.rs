//! CLI command handlers.

pub mod keygen;
pub mod serve;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
}
