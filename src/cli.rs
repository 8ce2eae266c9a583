use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sample the router and serve the live dashboard over HTTP
    Serve(Serve),
    /// Follow a running server from the terminal
    Watch(Watch),
}

#[derive(Parser, Clone, Debug)]
pub struct Serve {
    /// Router address (host or host:port)
    #[arg(long, env = "ROUTER_HOST")]
    pub router_host: String,

    /// Router user name (defaults to "admin" when a password is set)
    #[arg(long, env = "ROUTER_USER")]
    pub router_user: Option<String>,

    /// Router password; leave unset to read statistics anonymously
    #[arg(long, env = "ROUTER_PASSWORD", hide_env_values = true)]
    pub router_password: Option<String>,

    /// Seconds between two samples in the browser dashboard
    #[arg(long, env = "POLL_SECONDS")]
    pub poll_seconds: String,

    /// HTTP listen address
    #[arg(long, env = "FWAMON_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Seconds of history kept on the chart
    #[arg(long, env = "FWAMON_WINDOW_SECONDS", default_value_t = 180.0)]
    pub window_seconds: f64,

    /// Per-request timeout towards the router, in milliseconds
    #[arg(long, default_value_t = 4000)]
    pub device_timeout_ms: u64,
}

#[derive(Parser, Clone, Debug)]
pub struct Watch {
    /// Base URL of a running `fwamon serve`
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub url: String,

    /// Seconds between two samples
    #[arg(long, default_value_t = 1.0)]
    pub poll_seconds: f64,

    /// Seconds of history kept on the chart
    #[arg(long, default_value_t = 180.0)]
    pub window_seconds: f64,

    /// Fetch timeout in milliseconds (defaults to 80% of the poll interval)
    #[arg(long)]
    pub fetch_timeout_ms: Option<u64>,

    /// Also write the chart to this SVG file after every sample
    #[arg(long)]
    pub svg: Option<PathBuf>,
}
