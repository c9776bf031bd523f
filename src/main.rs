use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stillloop::config::{self, Config};
use stillloop::convert::Converter;
use stillloop::naming::is_png_or_jpg;
use stillloop::output::{self, ProbeLine};
use stillloop::types::OutputFormat;
use stillloop::video::{OpenH264Backend, VideoBackend, VideoStrategy, capture, codec};

fn version_string() -> &'static str {
    let on_tag = env!("STILLLOOP_ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("STILLLOOP_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "stillloop")]
#[command(about = "Turn still images into minimal looping GIFs or short MP4 clips")]
#[command(long_about = "\
Turn still images into minimal looping GIFs or short MP4 clips

Some platforms refuse to animate a single-frame upload. stillloop converts a
PNG or JPEG into the smallest artifact they will accept:

  gif    two identical frames, palette of up to 256 colors, loops forever
  video  about one second of MP4 (H.264), same frame repeated

Images are scaled to fit each format's envelope first:

  gif    at most 2048x2048
  video  at most 1920 wide; 1200 tall if landscape, 1900 tall otherwise

Run 'stillloop gen-config' to generate a documented stillloop.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to ./stillloop.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline steps (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert images (files or directories of PNG/JPEG)
    Convert {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output format (defaults to `default_format` from config)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Video strategy (overrides `video.strategy` from config)
        #[arg(long, value_enum)]
        strategy: Option<VideoStrategy>,
        /// Directory for converted files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// Print conversion reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which codecs and recorder containers the video backend supports
    Probe {
        #[arg(long, default_value_t = 1920)]
        width: u32,
        #[arg(long, default_value_t = 1080)]
        height: u32,
    },
    /// Print a stock stillloop.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Convert {
            inputs,
            format,
            strategy,
            output_dir,
            json,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(strategy) = strategy {
                config.video.strategy = strategy;
            }
            init_thread_pool(&config.processing);
            let format = format.unwrap_or(config.default_format);
            let failed = convert_all(config, collect_inputs(&inputs), &output_dir, format, json).await;
            if failed > 0 {
                return Err(format!("{failed} conversion(s) failed").into());
            }
        }
        Command::Probe { width, height } => {
            let backend = OpenH264Backend::new();
            let codecs: Vec<ProbeLine> = codec::codec_candidates()
                .iter()
                .map(|c| ProbeLine {
                    name: c.name.clone(),
                    supported: codec::probe(&backend, c, width, height, None),
                })
                .collect();
            let containers: Vec<ProbeLine> = capture::RECORDER_CONTAINERS
                .iter()
                .map(|c| ProbeLine {
                    name: c.to_string(),
                    supported: backend.supports_container(c),
                })
                .collect();
            output::print_probe_output(backend.name(), width, height, &codecs, &containers);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the fmt subscriber on stderr. INFO by default, DEBUG with `-v`.
fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

/// Load the explicit config file, or `./stillloop.toml` if it exists.
fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    match path {
        Some(path) if !path.exists() => Err(config::ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("config file not found: {}", path.display()),
        ))),
        Some(path) => config::load_config(path),
        None => config::load_config(Path::new(config::DEFAULT_CONFIG_FILE)),
    }
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

/// Expand directories into the PNG/JPEG files they contain, sorted by path.
/// Explicit file arguments are kept as given.
fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = walkdir::WalkDir::new(input)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| is_png_or_jpg(&entry.file_name().to_string_lossy(), None))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

/// Convert every input as its own task, then print results in input order.
/// Returns the number of failures.
async fn convert_all(
    config: Config,
    inputs: Vec<PathBuf>,
    output_dir: &Path,
    format: OutputFormat,
    json: bool,
) -> usize {
    let converter = Converter::with_openh264(config);
    let mut tasks = tokio::task::JoinSet::new();
    for (index, input) in inputs.into_iter().enumerate() {
        let converter = converter.clone();
        let output_dir = output_dir.to_path_buf();
        tasks.spawn(async move {
            let result = converter.convert_file(&input, &output_dir, format).await;
            (index, input, result)
        });
    }

    let mut results = Vec::new();
    let mut panicked = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(error = %e, "conversion task panicked");
                panicked += 1;
            }
        }
    }
    results.sort_by_key(|(index, _, _)| *index);

    let failed = results.iter().filter(|(_, _, r)| r.is_err()).count() + panicked;
    if json {
        let entries: Vec<serde_json::Value> = results
            .iter()
            .map(|(_, input, result)| match result {
                Ok((path, converted)) => serde_json::json!({
                    "input": input,
                    "output": path,
                    "report": converted.report,
                }),
                Err(e) => serde_json::json!({
                    "input": input,
                    "error": e.to_string(),
                }),
            })
            .collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize reports"),
        }
    } else {
        for (index, input, result) in &results {
            match result {
                Ok((path, converted)) => output::print_conversion(index + 1, &converted.report, path),
                Err(e) => output::print_conversion_error(index + 1, input, e),
            }
        }
        output::print_summary(results.len() + panicked - failed, failed);
    }
    failed
}
