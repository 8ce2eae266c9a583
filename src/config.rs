use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::{Serve, Watch};
use crate::sampler::SamplerOptions;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("ROUTER_HOST must not be empty")]
    MissingRouterHost,
    #[error("POLL_SECONDS must be a number, got {0:?}")]
    PollNotANumber(String),
    #[error("poll interval must be a positive number of seconds, got {0}")]
    InvalidPoll(f64),
    #[error("chart window must be a positive number of seconds, got {0}")]
    InvalidWindow(f64),
    #[error("fetch timeout ({timeout_ms} ms) must be shorter than the poll interval ({poll_ms} ms)")]
    FetchTimeoutTooLong { timeout_ms: u64, poll_ms: u64 },
}

/// Validated polling cadence shared by the server page and the terminal client.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Cadence {
    pub poll_seconds: f64,
    pub window_seconds: f64,
}

impl Cadence {
    pub fn new(poll_seconds: f64, window_seconds: f64) -> Result<Self, ConfigError> {
        if !poll_seconds.is_finite() || poll_seconds <= 0.0 {
            return Err(ConfigError::InvalidPoll(poll_seconds));
        }
        if !window_seconds.is_finite() || window_seconds <= 0.0 {
            return Err(ConfigError::InvalidWindow(window_seconds));
        }
        Ok(Self { poll_seconds, window_seconds })
    }

    /// Interval handed to the browser loop; never below 1 ms.
    pub fn poll_ms(&self) -> u64 {
        ((self.poll_seconds * 1000.0).floor() as u64).max(1)
    }

    pub fn window_ms(&self) -> u64 {
        (self.window_seconds * 1000.0).floor() as u64
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms())
    }
}

#[derive(Clone, Debug)]
pub struct ServeSettings {
    pub bind: SocketAddr,
    pub cadence: Cadence,
    pub sampler: SamplerOptions,
}

impl ServeSettings {
    pub fn from_args(args: &Serve) -> Result<Self, ConfigError> {
        let host = args.router_host.trim();
        if host.is_empty() {
            return Err(ConfigError::MissingRouterHost);
        }
        let poll_seconds = args
            .poll_seconds
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::PollNotANumber(args.poll_seconds.clone()))?;
        let cadence = Cadence::new(poll_seconds, args.window_seconds)?;
        Ok(Self {
            bind: args.bind,
            cadence,
            sampler: SamplerOptions {
                host: host.to_string(),
                user: args.router_user.clone(),
                password: args.router_password.clone(),
                timeout: Duration::from_millis(args.device_timeout_ms.max(1)),
            },
        })
    }

    pub fn router_host(&self) -> &str {
        &self.sampler.host
    }
}

#[derive(Clone, Debug)]
pub struct WatchSettings {
    pub url: String,
    pub cadence: Cadence,
    pub fetch_timeout: Duration,
    pub svg: Option<PathBuf>,
}

impl WatchSettings {
    pub fn from_args(args: &Watch) -> Result<Self, ConfigError> {
        let cadence = Cadence::new(args.poll_seconds, args.window_seconds)?;
        let poll_ms = cadence.poll_ms();
        let timeout_ms = match args.fetch_timeout_ms {
            Some(ms) if ms >= poll_ms => {
                return Err(ConfigError::FetchTimeoutTooLong { timeout_ms: ms, poll_ms })
            }
            Some(ms) => ms.max(1),
            // a 1 ms interval leaves no room; the fetch still gets 1 ms
            None => (poll_ms.saturating_mul(4) / 5).max(1),
        };
        Ok(Self {
            url: args.url.trim_end_matches('/').to_string(),
            cadence,
            fetch_timeout: Duration::from_millis(timeout_ms),
            svg: args.svg.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve(host: &str, poll: &str) -> Serve {
        Serve {
            router_host: host.into(),
            router_user: None,
            router_password: None,
            poll_seconds: poll.into(),
            bind: "127.0.0.1:8000".parse().unwrap(),
            window_seconds: 180.0,
            device_timeout_ms: 4000,
        }
    }

    #[test]
    fn poll_seconds_to_millis() {
        let s = ServeSettings::from_args(&serve("192.168.8.1", " 1.5 ")).unwrap();
        assert_eq!(s.cadence.poll_ms(), 1500);
        assert_eq!(s.cadence.poll_interval(), Duration::from_millis(1500));
        assert_eq!(s.router_host(), "192.168.8.1");
    }

    #[test]
    fn malformed_poll_is_fatal() {
        let err = ServeSettings::from_args(&serve("r", "fast")).unwrap_err();
        assert_eq!(err, ConfigError::PollNotANumber("fast".into()));
        let err = ServeSettings::from_args(&serve("r", "0")).unwrap_err();
        assert_eq!(err, ConfigError::InvalidPoll(0.0));
        assert!(ServeSettings::from_args(&serve("r", "-2")).is_err());
        assert!(ServeSettings::from_args(&serve("r", "inf")).is_err());
        assert!(ServeSettings::from_args(&serve("r", "NaN")).is_err());
    }

    #[test]
    fn empty_host_is_fatal() {
        let err = ServeSettings::from_args(&serve("  ", "1")).unwrap_err();
        assert_eq!(err, ConfigError::MissingRouterHost);
    }

    #[test]
    fn tiny_interval_rounds_up_to_one_ms() {
        let c = Cadence::new(0.0001, 10.0).unwrap();
        assert_eq!(c.poll_ms(), 1);
    }

    #[test]
    fn absurd_interval_does_not_overflow_the_timeout() {
        let args = Watch {
            url: "http://localhost:8000".into(),
            poll_seconds: 1e18,
            window_seconds: 1e9,
            fetch_timeout_ms: None,
            svg: None,
        };
        let s = WatchSettings::from_args(&args).unwrap();
        assert_eq!(s.cadence.poll_ms(), u64::MAX);
        assert!(s.fetch_timeout < s.cadence.poll_interval());
    }

    #[test]
    fn watch_timeout_defaults_below_interval() {
        let args = Watch {
            url: "http://localhost:8000/".into(),
            poll_seconds: 2.0,
            window_seconds: 60.0,
            fetch_timeout_ms: None,
            svg: None,
        };
        let s = WatchSettings::from_args(&args).unwrap();
        assert_eq!(s.fetch_timeout, Duration::from_millis(1600));
        assert_eq!(s.url, "http://localhost:8000");

        let too_long = Watch { fetch_timeout_ms: Some(2000), ..args };
        assert_eq!(
            WatchSettings::from_args(&too_long).unwrap_err(),
            ConfigError::FetchTimeoutTooLong { timeout_ms: 2000, poll_ms: 2000 }
        );
    }
}
