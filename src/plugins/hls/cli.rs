use crate::plugins::registry::{ArchiveCliConfig, CliPlugin};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;

pub struct HlsCliPlugin;

impl HlsCliPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl CliPlugin for HlsCliPlugin {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn augment_command(&self, cmd: Command) -> Command {
        cmd.arg(
            Arg::new("hls_concurrency")
                .long("concurrency")
                .help_heading("HLS")
                .help("Segments downloaded at the same time")
                .default_value("8")
                .num_args(1),
        )
        .arg(
            Arg::new("hls_poll_interval_secs")
                .long("poll-interval-secs")
                .help_heading("HLS")
                .help("Pause between live playlist polls, in seconds")
                .default_value("5")
                .num_args(1),
        )
        .arg(
            Arg::new("hls_cooldown_secs")
                .long("cooldown-secs")
                .help_heading("HLS")
                .help("Stop following the stream after this many seconds without a new segment")
                .default_value("60")
                .num_args(1),
        )
        .arg(
            Arg::new("hls_resolution")
                .long("resolution")
                .help_heading("HLS")
                .help("Preferred variant resolution, e.g. 1280x720")
                .num_args(1),
        )
        .arg(
            Arg::new("hls_bandwidth")
                .long("bandwidth")
                .help_heading("HLS")
                .help("Preferred variant bandwidth in bits/s (matched within 10 kbit/s)")
                .num_args(1),
        )
        .arg(
            Arg::new("hls_work_dir")
                .long("work-dir")
                .help_heading("HLS")
                .help("Segment directory; reusing one from an earlier run resumes it")
                .num_args(1),
        )
        .arg(
            Arg::new("hls_keep_segments")
                .long("keep-segments")
                .help_heading("HLS")
                .help("Keep the segment directory after assembling")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("hls_max_segments")
                .long("max-segments")
                .help_heading("HLS")
                .help("Refuse streams whose segment index reaches this value")
                .default_value("1000000")
                .num_args(1),
        )
    }

    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ArchiveCliConfig) -> anyhow::Result<()> {
        if let Some(s) = matches.get_one::<String>("hls_concurrency") {
            let n: usize = s.parse()?;
            if n == 0 {
                anyhow::bail!("--concurrency must be at least 1");
            }
            cfg.archive.concurrency = n;
        }
        if let Some(s) = matches.get_one::<String>("hls_poll_interval_secs") {
            cfg.archive.poll_interval = Duration::from_secs(s.parse()?);
        }
        if let Some(s) = matches.get_one::<String>("hls_cooldown_secs") {
            cfg.archive.tail_cooldown = Duration::from_secs(s.parse()?);
        }
        if let Some(r) = matches.get_one::<String>("hls_resolution") {
            cfg.preference.resolution = Some(r.trim().to_string());
        }
        if let Some(b) = matches.get_one::<String>("hls_bandwidth") {
            cfg.preference.bandwidth = Some(b.trim().parse()?);
        }
        if let Some(d) = matches.get_one::<String>("hls_work_dir") {
            cfg.archive.work_dir = Some(PathBuf::from(d));
        }
        cfg.archive.keep_segments = matches.get_flag("hls_keep_segments");
        if let Some(s) = matches.get_one::<String>("hls_max_segments") {
            let n: u64 = s.parse()?;
            if n == 0 {
                anyhow::bail!("--max-segments must be at least 1");
            }
            cfg.archive.max_segments = n;
        }
        Ok(())
    }
}
