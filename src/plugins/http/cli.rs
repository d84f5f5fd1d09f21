use crate::plugins::registry::{ArchiveCliConfig, CliPlugin};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub struct HttpCliPlugin;

impl HttpCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HttpCliPlugin {
    fn name(&self) -> &'static str {
        "http"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("http_header")
                .long("header")
                .help_heading("HTTP")
                .help("Extra HTTP header (repeatable), e.g. --header 'Cookie: session=xxx'")
                .action(ArgAction::Append)
                .num_args(1),
        )
        .arg(
            Arg::new("http_user_agent")
                .long("user-agent")
                .help_heading("HTTP")
                .help("HTTP User-Agent")
                .default_value("hls-archiver/0.1")
                .num_args(1),
        )
        .arg(
            Arg::new("http_timeout_secs")
                .long("timeout-secs")
                .help_heading("HTTP")
                .help("Per-attempt timeout for segment requests, in seconds")
                .default_value("10")
                .num_args(1),
        )
        .arg(
            Arg::new("http_retries")
                .long("retries")
                .help_heading("HTTP")
                .help("Attempts per segment, including the first")
                .default_value("3")
                .num_args(1),
        )
        .arg(
            Arg::new("http_retry_delay_secs")
                .long("retry-delay-secs")
                .help_heading("HTTP")
                .help("Fixed pause between attempts, in seconds")
                .default_value("5")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ArchiveCliConfig) -> anyhow::Result<()> {
        if let Some(ua) = matches.get_one::<String>("http_user_agent") {
            cfg.archive.user_agent = ua.clone();
        }
        if let Some(s) = matches.get_one::<String>("http_timeout_secs") {
            cfg.archive.retry.attempt_timeout = Duration::from_secs(s.parse()?);
        }
        if let Some(s) = matches.get_one::<String>("http_retries") {
            cfg.archive.retry.max_attempts = s.parse::<u32>()?.max(1);
        }
        if let Some(s) = matches.get_one::<String>("http_retry_delay_secs") {
            cfg.archive.retry.delay = Duration::from_secs(s.parse()?);
        }

        if let Some(values) = matches.get_many::<String>("http_header") {
            for h in values {
                let (k, v) = h
                    .split_once(':')
                    .ok_or_else(|| anyhow::anyhow!("invalid header format: {}", h))?;
                cfg.headers.insert(k.trim().to_string(), v.trim().to_string());
            }
        }

        Ok(())
    }
}
