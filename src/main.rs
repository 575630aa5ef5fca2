// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use kettle::recipe::CancelToken;
use kettle::recipe::kitchen::cancel_token;
use std::sync::atomic::Ordering;
use tracing::warn;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Set `cancel` on the first Ctrl-C
///
/// Runs a small current-thread runtime on its own thread so the pipeline
/// itself stays synchronous.
fn install_interrupt_handler(cancel: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Failed to start interrupt handler: {}", e);
                return;
            }
        };
        if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
            warn!("Interrupt received, cancelling the current stage");
            cancel.store(true, Ordering::SeqCst);
        }
    });
}

fn main() -> Result<()> {
    // Logs go to stderr so --json output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = cancel_token();

    let code = match cli.command {
        Some(Commands::Cook {
            formula,
            prefix,
            resolve,
            source_cache,
            timeout,
            test_timeout,
            allow_unverified,
            keep_builddir,
            json,
        }) => {
            install_interrupt_handler(cancel.clone());
            commands::cmd_cook(
                &formula,
                &prefix,
                &resolve,
                source_cache.as_deref(),
                timeout,
                test_timeout,
                allow_unverified,
                keep_builddir,
                json,
                cancel,
            )?
        }
        Some(Commands::Validate { formula }) => commands::cmd_validate(&formula)?,
        Some(Commands::Resolve {
            formula,
            prefix,
            resolve,
            json,
        }) => commands::cmd_resolve(&formula, &prefix, &resolve, json)?,
        Some(Commands::Fetch {
            formula,
            head,
            dest,
            source_cache,
            timeout,
            allow_unverified,
        }) => {
            install_interrupt_handler(cancel.clone());
            commands::cmd_fetch(
                &formula,
                head,
                dest.as_deref(),
                source_cache.as_deref(),
                timeout,
                allow_unverified,
                cancel,
            )?
        }
        Some(Commands::Test {
            formula,
            prefix,
            resolve,
            test_timeout,
            json,
        }) => {
            install_interrupt_handler(cancel.clone());
            commands::cmd_test(&formula, &prefix, &resolve, test_timeout, json, cancel)?
        }
        Some(Commands::Completions { shell }) => {
            commands::cmd_completions(shell)?;
            0
        }
        None => {
            Cli::command().print_help()?;
            0
        }
    };

    std::process::exit(code)
}
