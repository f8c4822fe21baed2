use anyhow::Result;
use clap::Parser;
use node_table::cli;
use node_table::logging::{init_logging, LogConfig};
use std::io::IsTerminal;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let log = LogConfig::from_verbosity(args.verbose)
        .with_format(args.log_format)
        .with_ansi(std::io::stderr().is_terminal());
    init_logging(&log);

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
