use clap::{Parser, Subcommand};
use imgpipe::batch::{self, BatchSettings};
use imgpipe::deadline::Deadline;
use imgpipe::imaging::{RustEngine, capabilities};
use imgpipe::options::{Gravity, ImageFormat, ProcessingOptions, Quality, ResizeMode};
use imgpipe::{config, output, pipeline};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Resize/crop options shared by `process` and `batch`.
#[derive(clap::Args, Clone)]
struct TransformArgs {
    /// Resize mode: fit, fill or crop
    #[arg(long, default_value = "fit")]
    resize: ResizeMode,

    /// Target width in pixels (0 = unconstrained, FIT only)
    #[arg(long, short = 'W', default_value_t = 0)]
    width: u32,

    /// Target height in pixels (0 = unconstrained, FIT only)
    #[arg(long, short = 'H', default_value_t = 0)]
    height: u32,

    /// Crop gravity: ce, no, ea, so, we or sm (smart)
    #[arg(long, default_value = "ce")]
    gravity: Gravity,

    /// Allow upscaling beyond the source dimensions
    #[arg(long)]
    enlarge: bool,

    /// Output format: jpeg, png or webp
    #[arg(long)]
    format: Option<ImageFormat>,
}

impl TransformArgs {
    fn options(&self, format: ImageFormat) -> ProcessingOptions {
        ProcessingOptions::new(self.resize, self.width, self.height, format)
            .with_gravity(self.gravity)
            .with_enlarge(self.enlarge)
    }
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgpipe")]
#[command(about = "Resize, crop and re-orient images with a fixed, deterministic pipeline")]
#[command(long_about = "\
Resize, crop and re-orient images with a fixed, deterministic pipeline

Every request runs the same stages in the same order:

  decode → orientation metadata → geometry plan
         → shrink-on-load re-decode (JPEG/WEBP) → alpha-safe resize
         → sRGB → rotate → flip → crop → encode

Resize modes:
  fit   scale to fit inside WIDTHxHEIGHT (one axis may be 0)
  fill  scale to cover WIDTHxHEIGHT, then crop the overflow by gravity
  crop  crop to WIDTHxHEIGHT without scaling

Set IMGPIPE_LOG=debug to trace each stage decision.
Run 'imgpipe gen-config' to generate a documented imgpipe.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Configuration file (missing file = stock defaults)
    #[arg(long, default_value = "imgpipe.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a single image
    Process {
        /// Source image
        input: PathBuf,
        /// Destination file; its extension picks the format unless --format is set
        dest: PathBuf,
        #[command(flatten)]
        transform: TransformArgs,
    },
    /// Process every image under a directory in parallel
    Batch {
        /// Directory to scan for images
        input: PathBuf,
        /// Directory to write results into
        out_dir: PathBuf,
        #[command(flatten)]
        transform: TransformArgs,
    },
    /// Show which formats the engine can decode and encode
    Capabilities {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock imgpipe.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let service_config = config::load_config(&cli.config)?;
    // Engine or registry failure means no request can be served.
    let engine = RustEngine::new(&service_config.engine)?;
    let registry = capabilities::init(&engine)?;
    let quality = Quality::new(service_config.quality);

    match cli.command {
        Command::Process {
            input,
            dest,
            transform,
        } => {
            let data = std::fs::read(&input)?;
            let source_format = ImageFormat::sniff(&data)
                .or_else(|| format_from_path(&input))
                .ok_or_else(|| format!("{}: unrecognized image format", input.display()))?;
            let format = transform
                .format
                .or_else(|| format_from_path(&dest))
                .unwrap_or(source_format);

            let deadline = Deadline::from_timeout(service_config.timeout());
            let bytes = pipeline::process_image(
                &engine,
                &data,
                source_format,
                &transform.options(format),
                quality,
                &deadline,
            )?;
            std::fs::write(&dest, &bytes)?;
            println!(
                "{} \u{2192} {} ({} bytes)",
                input.display(),
                dest.display(),
                bytes.len()
            );
        }
        Command::Batch {
            input,
            out_dir,
            transform,
        } => {
            init_thread_pool(&service_config.processing);
            let settings = BatchSettings {
                options: transform.options(transform.format.unwrap_or(ImageFormat::Jpeg)),
                quality,
                timeout: service_config.timeout(),
            };
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let summary = batch::run_batch(&engine, registry, &input, &out_dir, &settings, Some(tx))?;
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;
            output::print_batch_summary(&summary, Some(engine.cache_stats()));
        }
        Command::Capabilities { json } => {
            if json {
                println!("{}", output::format_capabilities_json(registry)?);
            } else {
                output::print_capabilities(registry);
            }
        }
        // Printed before engine startup
        Command::GenConfig => {}
    }

    engine.shutdown();
    Ok(())
}

fn format_from_path(path: &Path) -> Option<ImageFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFormat::from_extension)
}

/// Install the stderr log subscriber, filtered by `IMGPIPE_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("IMGPIPE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
