use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use fwamon::cli::{Cli, Commands};
use fwamon::config::{ConfigError, ServeSettings, WatchSettings};
use fwamon::net::server::run_serve;
use fwamon::ui::dashboard::run_watch;

fn init_tracing(default_directive: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn main() {
    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Serve(serve)) => {
            init_tracing("info");
            ServeSettings::from_args(&serve)
                .map_err(anyhow::Error::from)
                .and_then(|settings| tokio::runtime::Runtime::new()?.block_on(run_serve(settings)))
        }
        Some(Commands::Watch(watch)) => {
            // the terminal belongs to the dashboard unless logs are asked for
            if std::env::var_os("RUST_LOG").is_some() {
                init_tracing("warn");
            }
            WatchSettings::from_args(&watch)
                .map_err(anyhow::Error::from)
                .and_then(|settings| run_watch(settings, &tokio::runtime::Runtime::new()?))
        }
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: bad configuration, 4: bind failure, 1: other
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return 2;
        }
        if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind::*;
            return match ioe.kind() {
                AddrInUse | AddrNotAvailable | PermissionDenied => 4,
                _ => 1,
            };
        }
    }
    1
}
