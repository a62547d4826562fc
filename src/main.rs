use clap::Parser;
use log::error;
use quote_mailer::{init_logging, run, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _handle = init_logging(cli.log_level.into(), &cli.log_dir)?;
    if let Err(e) = run(cli) {
        // Logged so the failure also lands in the log file, returning it gives the non-zero exit code
        error!("Program execution failed: {e:?}");
        return Err(e);
    }
    Ok(())
}
