#[macro_use]
extern crate tracing;

use clap::Parser;

mod args;
mod commands;
mod log;

use args::ArgsParser;

fn main() -> anyhow::Result<()> {
    let args = ArgsParser::parse();
    let _guard = log::init_logging(args.log_dir.clone())?;
    let result = commands::delegate(args);
    if let Err(e) = &result {
        error!("command failed: {e:?}");
    }
    result
}
