//! CLI binary for imgbatch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use imgbatch::{
    convert_to_archive, write_items, ArchiveCompression, BatchProgressCallback, CollisionPolicy,
    ConversionConfig, ConversionError, ConvertedItem, ProgressCallback, TargetFormat,
    DEFAULT_ARCHIVE_NAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

/// `10240` → `10.0 KB`.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch, the current image's
/// percentage in the message, and a log line per finished image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of the image in flight.
    started: Mutex<Option<Instant>>,
    /// Name of the image in flight.
    current: Mutex<String>,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            current: Mutex::new(String::new()),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_items} images…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut s) = self.started.lock() {
            *s = Some(Instant::now());
        }
        if let Ok(mut c) = self.current.lock() {
            *c = name.to_string();
        }
        self.bar.set_message(name.to_string());
    }

    fn on_item_progress(&self, _index: usize, percent: u8) {
        let name = self.current.lock().map(|c| c.clone()).unwrap_or_default();
        self.bar.set_message(format!("{name} {}", dim(&format!("{percent:>3}%"))));
    }

    fn on_item_fallback(&self, _index: usize, _total: usize, _error: &ConversionError) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_complete(&self, index: usize, total: usize, item: &ConvertedItem) {
        let secs = self.elapsed_secs();
        let line = match item.error() {
            None => format!(
                "  {} {:>3}/{:<3} {:<28} {} → {}  {}  {}",
                green("✓"),
                index + 1,
                total,
                item.output_name,
                human_size(item.original_size),
                human_size(item.output_size),
                dim(&format!("{:>4}% smaller", item.percent_smaller())),
                dim(&format!("{secs:.1}s")),
            ),
            Some(error) => {
                let msg = error.to_string();
                // Truncate very long error messages to keep output tidy.
                let msg = match msg.char_indices().nth(79) {
                    Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
                    None => msg,
                };
                format!(
                    "  {} {:>3}/{:<3} {:<28} {}  {}",
                    red("✗"),
                    index + 1,
                    total,
                    item.output_name,
                    red(&format!("kept unchanged: {msg}")),
                    dim(&format!("{secs:.1}s")),
                )
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_items: usize, _any_error: bool) {
        self.bar.finish_and_clear();
        let failed = self.fallbacks.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} images converted successfully",
                green("✔"),
                bold(&total_items.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images converted  ({} kept unchanged)",
                if failed == total_items {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&(total_items - failed).to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert to WebP (default) and write converted-images.zip
  imgbatch photos/*.jpg

  # AVIF at quality 60, archive written elsewhere
  imgbatch --format avif -q 60 -o out/avif.zip a.png b.png

  # Also write the individual files
  imgbatch --format jpeg --out-dir converted/ scans/*.tiff

  # Fail the process if any image could not be converted
  imgbatch --strict *.png

  # Machine-readable summary
  imgbatch --json --no-progress *.png > summary.json

FORMATS:
  webp   quality 0–100, lossy (default)
  jpeg   quality 1–100
  png    quality picks the zlib level: 0–33 best, 34–66 default, 67–100 fast
  avif   quality 1–100
  svg    pass-through: bytes are kept, only the extension changes

FAILED IMAGES:
  An image that cannot be converted is stored in the archive with its
  original bytes under the new name, and the batch carries on.

ENVIRONMENT VARIABLES:
  RUST_LOG               Override the log filter (e.g. imgbatch=debug)
  IMGBATCH_*             Every flag, e.g. IMGBATCH_FORMAT=avif
"#;

/// Batch-convert images and bundle them into a zip archive.
#[derive(Parser, Debug)]
#[command(
    name = "imgbatch",
    version,
    about = "Batch-convert images to WebP, JPEG, PNG or AVIF and zip the results",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files to convert, in archive order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target format: webp, jpeg, png, avif, svg.
    #[arg(short, long, env = "IMGBATCH_FORMAT", default_value = "webp")]
    format: String,

    /// Quality, 0 (smallest) to 100 (best).
    #[arg(short, long, env = "IMGBATCH_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    quality: u8,

    /// Archive path.
    #[arg(short, long, env = "IMGBATCH_OUTPUT", default_value = DEFAULT_ARCHIVE_NAME)]
    output: PathBuf,

    /// Also write every converted image into this directory.
    #[arg(long, env = "IMGBATCH_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Longest edge in pixels after resizing.
    #[arg(long, env = "IMGBATCH_MAX_DIMENSION", default_value_t = 4096)]
    max_dimension: u32,

    /// Target maximum size per image, in MiB.
    #[arg(long, env = "IMGBATCH_MAX_SIZE_MB", default_value_t = 5.0)]
    max_size_mb: f64,

    /// What to do when two images map to the same output name.
    #[arg(long, env = "IMGBATCH_COLLISION", value_enum, default_value = "suffix")]
    collision: CollisionArg,

    /// Deflate archive entries instead of storing them.
    #[arg(long, env = "IMGBATCH_DEFLATE")]
    deflate: bool,

    /// Exit with an error if any image was kept unchanged.
    #[arg(long, env = "IMGBATCH_STRICT")]
    strict: bool,

    /// Print a JSON summary (BatchOutput without payloads) to stdout.
    #[arg(long, env = "IMGBATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMGBATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMGBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, env = "IMGBATCH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CollisionArg {
    /// b.webp, b (1).webp, …
    Suffix,
    /// Fail packaging.
    Reject,
    /// Later images overwrite earlier ones.
    Last,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(v: CollisionArg) -> Self {
        match v {
            CollisionArg::Suffix => CollisionPolicy::AutoSuffix,
            CollisionArg::Reject => CollisionPolicy::Reject,
            CollisionArg::Last => CollisionPolicy::LastWriteWins,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert_to_archive(&cli.inputs, &cli.output, &config)
        .await
        .context("Conversion failed")?;

    if let Some(ref dir) = cli.out_dir {
        write_items(&output.items, dir, &config.archive)
            .await
            .with_context(|| format!("Failed to write images to {}", dir.display()))?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    let stats = &output.stats;
    if !cli.quiet {
        eprintln!(
            "{}  {}/{} images  {} → {}  {}ms  →  {}",
            if stats.fallback_items == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.total_items - stats.fallback_items,
            stats.total_items,
            human_size(stats.total_original_bytes),
            human_size(stats.total_output_bytes),
            stats.duration_ms,
            bold(&cli.output.display().to_string()),
        );
    }

    if cli.strict && output.any_error {
        anyhow::bail!(
            "{} of {} images could not be converted",
            stats.fallback_items,
            stats.total_items
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let format: TargetFormat = cli.format.parse().context("Invalid --format")?;
    if !(cli.max_size_mb > 0.0) {
        anyhow::bail!("--max-size-mb must be positive (got {})", cli.max_size_mb);
    }
    let max_bytes = (cli.max_size_mb * 1024.0 * 1024.0) as u64;

    let mut builder = ConversionConfig::builder()
        .format(format)
        .quality(cli.quality)
        .max_dimension(cli.max_dimension)
        .max_output_bytes(max_bytes)
        .collision_policy(cli.collision.clone().into())
        .archive_compression(if cli.deflate {
            ArchiveCompression::Deflated
        } else {
            ArchiveCompression::Stored
        });

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
