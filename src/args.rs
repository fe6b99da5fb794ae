use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct ArgsParser {
    #[arg(
        long,
        global = true,
        help = "also write logs to <log_dir>, rotated hourly (stdout logging is always on)"
    )]
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// dump info about the on-disk structures (and optionally of the database in `dir`)
    Infodump {
        #[arg(long, help = "if provided, will dump information about the database in <dir>")]
        dir: Option<PathBuf>,
        #[arg(long, default_value = "db", help = "name of the database (data files are <db>.<n>)")]
        db: String,
        #[arg(short, long, help = "configuration file (toml), defaults are used if not given")]
        config: Option<PathBuf>,
    },
    /// insert records into a collection, then read them all back through the access gate
    Fill {
        #[command(flatten)]
        db: DbArgs,
        #[arg(long, help = "collection to insert into")]
        ns: String,
        #[arg(long, default_value_t = 1000, help = "number of records to insert")]
        count: usize,
        #[arg(long, default_value_t = 256, help = "payload size of each record (bytes)")]
        size: usize,
    },
}

#[derive(Args, Debug)]
pub struct DbArgs {
    #[arg(short, long, help = "directory the data files (and catalog) are kept in")]
    pub dir: PathBuf,
    #[arg(long, default_value = "db", help = "name of the database (data files are <db>.<n>)")]
    pub db: String,
    #[arg(short, long, help = "configuration file (toml), defaults are used if not given")]
    pub config: Option<PathBuf>,
}
