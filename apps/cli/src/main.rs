//! catalogbuilder CLI: reconcile supplier cost and sale price lists into
//! Template-conformant catalog workbooks.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
