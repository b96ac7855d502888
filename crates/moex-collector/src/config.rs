//! Configuration for moex-collector
//!
//! Every setting has a default and can be overridden by a flag or an
//! environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::collector::CollectorSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "moex-collector")]
#[command(about = "MOEX ISS trades to NATS JetStream collector")]
pub struct Config {
    /// ISS trading engine (e.g. stock, currency, futures)
    #[arg(long, env = "MOEX_ENGINE", default_value = "stock")]
    pub engine: String,

    /// ISS market within the engine (e.g. shares, bonds)
    #[arg(long, env = "MOEX_MARKET", default_value = "shares")]
    pub market: String,

    /// Time between collection cycles (e.g. 500ms, 15s, 1m)
    #[arg(long, env = "POLL_INTERVAL", default_value = "15s", value_parser = parse_duration)]
    pub poll_interval: Duration,

    /// ISS base URL
    #[arg(long, env = "MOEX_BASE_URL", default_value = "https://iss.moex.com")]
    pub base_url: String,

    /// Per-request HTTP timeout
    #[arg(long, env = "HTTP_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub http_timeout: Duration,

    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// Subject prefix; trades go to {prefix}.trade.{secid}
    #[arg(long, env = "TRADES_SUBJECT_PREFIX", default_value = "iss_data")]
    pub subject_prefix: String,

    /// JetStream stream holding the trade subjects
    #[arg(long, env = "TRADES_STREAM", default_value = "ISS_DATA")]
    pub stream: String,

    /// How long the stream keeps trades, when it is created by the collector
    #[arg(long, env = "TRADES_STREAM_MAX_AGE", default_value = "7d", value_parser = parse_duration)]
    pub stream_max_age: Duration,

    /// File holding the id of the last published trade
    #[arg(long, env = "STATE_FILE_PATH", default_value = "./.last_trade_id")]
    pub state_file: PathBuf,

    /// Metrics/health listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub listen_addr: SocketAddr,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Config {
    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            engine: self.engine.clone(),
            market: self.market.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

/// Parse a duration like "500ms", "15s", "1m", "2h" or "7d"
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration: {}", s))?;
    let (num_str, unit) = s.split_at(split);
    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;

    if num == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        _ => return Err(format!("unknown unit: {}", unit)),
    };
    num.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: {}", s))
}
