//! rwkvforge command line entry point.

use anyhow::Result;
use clap::Parser;
use rwkvforge_cli::cli::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
