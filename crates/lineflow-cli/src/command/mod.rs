use clap::{Parser, Subcommand};

use self::{lines::LinesArg, train::TrainArg};

mod lines;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train an agent on a production line
    Train(#[clap(flatten)] Box<TrainArg>),
    /// Describe every line variant as JSON
    Lines(#[clap(flatten)] LinesArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Lines(arg) => lines::run(&arg)?,
    }
    Ok(())
}
