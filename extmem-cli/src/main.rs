mod build;
mod convert;
mod inspect;

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use crate::build::{BuildFlags, exec_build};
use crate::convert::exec_convert;
use crate::inspect::exec_inspect;

#[derive(clap::Parser)]
#[command(name = "xm", version, about = "Build and inspect external-memory sparse page caches")]
struct Cli {
    /// Log more detail. Repeat for trace output.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Stream a LibSVM text file into a row-page cache.
    Build {
        /// LibSVM input, one row per line.
        input: PathBuf,

        /// Cache spec: one or more shard prefixes separated by ':'.
        cache: String,

        /// Rows parsed per block.
        #[arg(long, default_value_t = extmem_page::DEFAULT_BLOCK_SIZE)]
        block_size: usize,

        /// Flush a page once it holds this many bytes.
        #[arg(long, default_value_t = extmem_cache::DEFAULT_PAGE_SIZE_TARGET)]
        page_size: usize,
    },
    /// Derive a column-page cache from an existing row-page cache.
    Convert {
        cache: String,

        /// Sort every column's entries by value.
        #[arg(long)]
        sorted: bool,
    },
    /// Print a cache's metadata and page statistics.
    Inspect {
        cache: String,

        /// The page file to scan.
        #[arg(long, default_value = ".row.page")]
        page_type: String,
    },
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::Warn,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    TermLogger::init(
        cli.log_level(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .ok();

    match cli.command {
        Commands::Build {
            input,
            cache,
            block_size,
            page_size,
        } => exec_build(
            &input,
            &cache,
            BuildFlags {
                block_size,
                page_size,
            },
        )?,
        Commands::Convert { cache, sorted } => exec_convert(&cache, sorted)?,
        Commands::Inspect { cache, page_type } => {
            let page_type = page_type.parse()?;
            let report = exec_inspect(&cache, page_type)?;
            println!("{report}");
        }
    }

    Ok(())
}
