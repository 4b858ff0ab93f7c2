mod cli;
mod config;
mod interrupt;
mod progress;

use std::io::IsTerminal;
use std::process;
use std::sync::Arc;

use clap::Parser;
use ffdist::logging::{self, LoggingOptions, Verbosity};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Args;
use crate::progress::BarProgress;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        let code = match e.downcast_ref::<ffdist::Error>() {
            Some(err) => {
                if let Some(diagnostics) = err.diagnostics()
                    && !diagnostics.trim().is_empty()
                {
                    eprintln!("{}", diagnostics.trim_end());
                }
                err.exit_code()
            }
            None => 1,
        };
        eprintln!("Error: {:#}", e);
        process::exit(code);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let verbosity = if args.quiet {
        Verbosity::Quiet
    } else if args.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };

    let progress = Arc::new(BarProgress::new(
        !args.quiet && std::io::stderr().is_terminal(),
    ));
    let _log_guard = logging::init_logging(
        &LoggingOptions {
            verbosity,
            log_dir: args.log_dir.clone(),
            ansi: std::io::stderr().is_terminal(),
        },
        progress.log_writer(),
    )?;
    if let Some(log_dir) = &args.log_dir
        && let Err(e) = logging::cleanup_old_logs(log_dir, logging::LOG_RETENTION_DAYS).await
    {
        warn!("Failed to clean up old logs: {}", e);
    }

    let mut config = config::load(args.config.as_deref())?;
    config::apply_args(&mut config, &args);

    let cancel = CancellationToken::new();
    interrupt::install(cancel.clone());

    let result = ffdist::encode(
        &config,
        &args.input,
        &args.output,
        progress.clone(),
        cancel,
    )
    .await;
    progress.clear();

    let report = result?;
    info!(
        "Done: {} chunks ({} reused) on {} host(s) in {:.1}s",
        report.chunks,
        report.reused,
        report.pool.workers.len(),
        report.elapsed.as_secs_f64()
    );
    if report.work_dir_kept {
        info!("Segments kept in {}", report.work_dir.display());
    }
    Ok(())
}
