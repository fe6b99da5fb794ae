use std::path::Path;

use anyhow::{bail, Result};
use extentstore::config::{self, StoreConfig};

use crate::args::{ArgsParser, Cmd, DbArgs};

pub mod fill;
pub mod infodump;

pub fn delegate(args: ArgsParser) -> Result<()> {
    match args.cmd {
        Cmd::Infodump { dir, db, config } => {
            let cfg = load_config(config.as_deref())?;
            infodump::main(dir, &db, cfg)
        }
        Cmd::Fill {
            db: DbArgs { dir, db, config },
            ns,
            count,
            size,
        } => {
            let cfg = load_config(config.as_deref())?;
            fill::main(&dir, &db, &ns, count, size, cfg)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    let Some(path) = path else {
        debug!("no configuration given, using defaults");
        return Ok(StoreConfig::default());
    };
    info!("Reading configuration from {path:?}");
    if !path.exists() {
        error!("Configuration file does not exist!");
        bail!("Configuration file does not exist!");
    }
    config::open(path)
}
