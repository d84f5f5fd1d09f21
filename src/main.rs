use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use hls_archiver::core::events::{ArchiveEvent, ProgressSnapshot};
use hls_archiver::core::model::{ArchiveRequest, RequestHeaders, VariantPreference};
use hls_archiver::core::resolver::PlaylistResolver;
use hls_archiver::core::session::{ArchiveSession, SessionOutcome, SessionReport};
use hls_archiver::core::config::ArchiveConfig;
use hls_archiver::i18n::{get_messages, phase_label, Locale, Messages};
use hls_archiver::logging;
use hls_archiver::plugins::registry::{ArchiveCliConfig, PluginRegistry, ResolvedInput};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::sync::{broadcast, watch};

fn build_cli(registry: &PluginRegistry) -> Command {
    let input = Arg::new("input")
        .help("Playlist URL, a file containing a playlist or a URL, or - to read stdin")
        .required(true)
        .num_args(1);

    let archive = Command::new("archive")
        .about("Download a live stream's backlog, follow it until it goes quiet, and write one file")
        .arg(input.clone())
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .help("Destination file (default: HLS_Stream_<resolution>_<bandwidth>.ts)")
                .num_args(1),
        );
    let archive = registry.augment_command(archive);

    let variants = Command::new("variants").about("List the variants of a master playlist").arg(input);
    let variants = registry.augment_command(variants);

    Command::new("hls-archiver")
        .about("Resumable, concurrent archiver for live HLS streams")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("Console language (en, zh)")
                .global(true)
                .default_value("en")
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output on stderr (-v, -vv); RUST_LOG overrides")
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(archive)
        .subcommand(variants)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = PluginRegistry::with_defaults();
    let matches = build_cli(&registry).get_matches();

    logging::init_logging(matches.get_count("verbose"))?;
    let locale = matches.get_one::<String>("locale").map(|s| Locale::parse(s)).unwrap_or_default();

    match matches.subcommand() {
        Some(("archive", m)) => run_archive(&registry, m, locale).await,
        Some(("variants", m)) => run_variants(&registry, m, locale).await,
        _ => Ok(()),
    }
}

async fn prepare(registry: &PluginRegistry, m: &ArgMatches) -> anyhow::Result<(ArchiveCliConfig, ResolvedInput)> {
    let raw = m.get_one::<String>("input").context("missing input")?;

    let mut cfg = ArchiveCliConfig {
        headers: RequestHeaders::new(),
        preference: VariantPreference::default(),
        archive: ArchiveConfig::default(),
    };
    registry.apply_matches(m, &mut cfg)?;

    let resolver = registry
        .best_resolver(raw)
        .ok_or_else(|| anyhow::anyhow!("unsupported input {raw:?}: expected an http(s) URL, a file, or -"))?;
    let mut input = resolver
        .resolve(raw)
        .await
        .with_context(|| format!("{} could not read {raw:?}", resolver.name()))?;
    // explicit --header values win over anything found in a pasted document
    input.headers.extend(cfg.headers.clone());
    Ok((cfg, input))
}

async fn run_variants(registry: &PluginRegistry, m: &ArgMatches, locale: Locale) -> anyhow::Result<()> {
    let msgs = get_messages(locale);
    let (cfg, input) = prepare(registry, m).await?;
    for w in &input.warnings {
        eprintln!("[{}] {}", msgs.warn_prefix, w);
    }

    let fetch = registry.default_fetcher(&cfg.archive)?;
    let resolver = PlaylistResolver::new(fetch, input.headers, cfg.archive.playlist_timeout);
    let variants = resolver.list_variants(&input.reference).await?;
    if variants.is_empty() {
        println!("{}", msgs.no_variants);
        return Ok(());
    }

    println!("{}:", msgs.variants_header);
    for (i, v) in variants.iter().enumerate() {
        println!("{:>3}. {:<10} {:>12}  {}", i + 1, v.resolution_label(), v.bandwidth_label(), v.url);
    }
    Ok(())
}

async fn run_archive(registry: &PluginRegistry, m: &ArgMatches, locale: Locale) -> anyhow::Result<()> {
    let msgs = get_messages(locale);
    let (cfg, input) = prepare(registry, m).await?;
    for w in &input.warnings {
        eprintln!("[{}] {}", msgs.warn_prefix, w);
    }

    let request = ArchiveRequest {
        reference: input.reference,
        destination: m.get_one::<String>("output").map(PathBuf::from),
        headers: input.headers,
        preference: cfg.preference,
    };
    let fetch = registry.default_fetcher(&cfg.archive)?;
    let keep_segments = cfg.archive.keep_segments;
    let session = ArchiveSession::new(request, cfg.archive, fetch);
    println!("{}: {}", msgs.session_started, session.id());

    let ui_task = tokio::spawn(render_events(session.subscribe(), locale));

    let (work_dir, dir_task) = track_work_dir(session.subscribe());
    let cancel = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\n{}", msgs.interrupt_hint);
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", msgs.interrupt_forced);
            if let Some(dir) = work_dir.borrow().as_ref() {
                eprintln!("{}: {} ({})", msgs.work_dir_label, dir.display(), msgs.resume_hint);
            }
            std::process::exit(130);
        }
    });

    let report = session.run().await;
    interrupt.abort();
    dir_task.abort();
    let _ = ui_task.await;

    print_summary(&report, msgs, keep_segments);
    println!("{}: {}", msgs.session_finished, report.session_id);

    match report.outcome {
        SessionOutcome::Failed { cause } => Err(cause.into()),
        _ => Ok(()),
    }
}

/// Latest `WorkDirReady` path, for the forced-exit message.
fn track_work_dir(
    mut rx: broadcast::Receiver<ArchiveEvent>,
) -> (watch::Receiver<Option<PathBuf>>, tokio::task::JoinHandle<()>) {
    let (tx, dir) = watch::channel(None);
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ArchiveEvent::WorkDirReady { path }) => {
                    let _ = tx.send(Some(path));
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    (dir, task)
}

/// Renders session events until the session reaches a terminal phase or drops its sender.
async fn render_events(mut rx: broadcast::Receiver<ArchiveEvent>, locale: Locale) {
    let msgs = get_messages(locale);
    let mp = MultiProgress::new();
    let sty_spinner = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("|/-\\ ");
    let sty_bar = ProgressStyle::with_template("{prefix} {bar:40.cyan/blue} {pos}/{len} ({elapsed}) {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let pb = mp.add(ProgressBar::new_spinner());
    pb.set_style(sty_spinner);
    pb.set_prefix(format!("[{}]", msgs.segments_label));
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    loop {
        let evt = match rx.recv().await {
            Ok(e) => e,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match evt {
            ArchiveEvent::PhaseChanged { phase, .. } => {
                let _ = mp.println(format!("[{}] {}", msgs.phase_prefix, phase_label(locale, phase)));
                if phase.is_terminal() {
                    pb.finish_and_clear();
                    break;
                }
            }
            ArchiveEvent::VariantSelected { variant } => {
                let _ = mp.println(format!(
                    "[{}] {}: {} {} {}",
                    msgs.info_prefix,
                    msgs.variant_selected,
                    variant.resolution_label(),
                    variant.bandwidth_label(),
                    variant.url
                ));
            }
            ArchiveEvent::Resolved { media_url, horizon, .. } => {
                let _ = mp.println(format!(
                    "[{}] {}: {} ({} {})",
                    msgs.info_prefix, msgs.media_playlist, media_url, msgs.horizon, horizon
                ));
            }
            ArchiveEvent::WorkDirReady { path } => {
                let _ = mp.println(format!("[{}] {}: {}", msgs.info_prefix, msgs.work_dir_label, path.display()));
            }
            ArchiveEvent::SegmentsDiscovered { first, last } => {
                let _ = mp.println(format!("[{}] {}: {}..={}", msgs.info_prefix, msgs.discovered, first, last));
            }
            ArchiveEvent::SegmentFailed { index, attempts, reason } => {
                let _ = mp.println(format!("[{}] #{} ({}x): {}", msgs.error_prefix, index, attempts, reason));
            }
            ArchiveEvent::Progress(p) => {
                if pb.length() != Some(p.total) {
                    pb.set_style(sty_bar.clone());
                    pb.set_length(p.total);
                }
                pb.set_position(p.completed);
                pb.set_message(progress_line(&p));
            }
            ArchiveEvent::Warning { scope, message } => {
                let _ = mp.println(format!("[{}] {}: {}", msgs.warn_prefix, scope, message));
            }
            ArchiveEvent::Info { scope, message } => {
                let _ = mp.println(format!("[{}] {}: {}", msgs.info_prefix, scope, message));
            }
        }
    }
}

fn progress_line(p: &ProgressSnapshot) -> String {
    format!(
        "new {} | resumed {} | failed {} | {}",
        p.downloaded,
        p.skipped,
        p.failed,
        fmt_bytes(p.bytes)
    )
}

fn print_summary(report: &SessionReport, msgs: &Messages, keep_segments: bool) {
    println!();
    println!("{}:", msgs.summary_header);
    match &report.outcome {
        SessionOutcome::Completed { output } => {
            println!("- {}", msgs.outcome_completed);
            println!("- {}: {}", msgs.output_label, output.display());
        }
        SessionOutcome::CompletedWithGaps { output, skipped } => {
            println!("- {}", msgs.outcome_gaps);
            println!("- {}: {}", msgs.output_label, output.display());
            println!("- {} ({}): {:?}", msgs.missing_label, skipped.len(), skipped);
        }
        SessionOutcome::Failed { cause } => {
            println!("- {}: {}", msgs.outcome_failed, cause);
        }
    }
    if let Some(v) = &report.variant {
        println!("- {}: {} {}", msgs.variant_selected, v.resolution_label(), v.bandwidth_label());
    }
    println!("- {}: {}/{} ({})", msgs.segments_label, report.progress.completed, report.progress.total, progress_line(&report.progress));
    if let Some(w) = &report.cleanup_warning {
        println!("  [{}] {}", msgs.warn_prefix, w);
    }
    if keep_segments || report.cleanup_warning.is_some() {
        if let Some(dir) = &report.work_dir {
            println!("- {}: {}", msgs.work_dir_label, dir.display());
        }
    }
}

fn fmt_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let f = n as f64;
    if f >= GB {
        format!("{:.2}GiB", f / GB)
    } else if f >= MB {
        format!("{:.2}MiB", f / MB)
    } else if f >= KB {
        format!("{:.2}KiB", f / KB)
    } else {
        format!("{}B", n)
    }
}
