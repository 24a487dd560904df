//! Keygen command - prints cookie keys for the environment file.

use anyhow::Result;
use base64::{Engine, engine::general_purpose::STANDARD};
use clap::Args;

use bore_auth_session::SessionKeys;

use super::Context;

/// Arguments for the keygen command.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Print bare keys, one per line, without variable names
    #[arg(long)]
    pub bare: bool,
}

/// Run the keygen command.
pub fn run(args: KeygenArgs, _ctx: &Context) -> Result<()> {
    print!("{}", render(&SessionKeys::generate(), args.bare));
    Ok(())
}

fn render(keys: &SessionKeys, bare: bool) -> String {
    let hash = STANDARD.encode(keys.hash_key);
    let block = STANDARD.encode(keys.block_key);
    if bare {
        format!("{}\n{}\n", hash, block)
    } else {
        format!("COOKIE_HASH_KEY={}\nCOOKIE_BLOCK_KEY={}\n", hash, block)
    }
}
