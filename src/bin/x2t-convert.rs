//! CLI binary for edgequake-x2t.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConverterConfig`, runs one conversion through a native x2t executable
//! and writes the result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_x2t::pipeline::classify::{byte_size, classify, is_data_url};
use edgequake_x2t::{
    format_size, formats, save_output, ConversionRequest, ConversionResult, ConverterConfig,
    FileHandle, Input, ProcessEngineLoader, X2tConverter,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

fn spinner(prefix: &str, msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix(prefix.to_string());
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Legacy Word document to the editor's intermediate format (doc → docx → bin)
  x2t-convert --engine /opt/onlyoffice/x2t report.doc

  # Intermediate format back to a document
  x2t-convert --engine /opt/onlyoffice/x2t --from bin --to xlsx Editor.bin -o sheet.xlsx

  # Export to PDF, keep extracted images
  x2t-convert --engine /opt/onlyoffice/x2t --from bin --to pdf Editor.bin --media-dir ./media

  # Only upgrade a legacy format
  x2t-convert --engine /opt/onlyoffice/x2t --mode normalize slides.ppt

  # Remote input
  x2t-convert --engine /opt/onlyoffice/x2t https://example.com/files/budget.xls

  # What would be converted? (no engine needed)
  x2t-convert --inspect-only report.doc

ENVIRONMENT VARIABLES:
  X2T_ENGINE          Path to the x2t executable
  X2T_ENGINE_ROOT     Host directory backing the engine working root
  RUST_LOG            Overrides --verbose / --quiet log filtering
"#;

/// Convert office documents with the x2t engine.
#[derive(Parser, Debug)]
#[command(
    name = "x2t-convert",
    version,
    about = "Convert office documents with the x2t engine",
    long_about = "Convert office documents (local files, URLs, data URLs) to and from the \
editor's intermediate .bin format using a native x2t executable. Legacy doc/xls/ppt files are \
normalised to docx/xlsx/pptx first.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path, HTTP(S) URL, data URL, file:// URL or literal text.
    input: String,

    /// File name used for the workspace and the output (default: derived
    /// from the input).
    #[arg(long, env = "X2T_NAME")]
    name: Option<String>,

    /// Source extension (default: extension of --name or of the input path).
    #[arg(long, env = "X2T_FROM")]
    from: Option<String>,

    /// Target extension. `bin` converts to the intermediate format.
    #[arg(long, env = "X2T_TO")]
    to: Option<String>,

    /// Conversion chain to run (default: chosen from --from / --to).
    #[arg(long, env = "X2T_MODE", value_enum)]
    mode: Option<ModeArg>,

    /// Path to the x2t executable.
    #[arg(long, env = "X2T_ENGINE")]
    engine: Option<PathBuf>,

    /// Host directory backing the engine working root (temporary by default).
    #[arg(long, env = "X2T_ENGINE_ROOT")]
    engine_root: Option<PathBuf>,

    /// Write the converted document here (default: ./<name><ext>).
    #[arg(short, long, env = "X2T_OUTPUT")]
    output: Option<PathBuf>,

    /// Write extracted media files into this directory.
    #[arg(long, env = "X2T_MEDIA_DIR")]
    media_dir: Option<PathBuf>,

    /// Print a JSON summary of the result on stdout.
    #[arg(long, env = "X2T_JSON")]
    json: bool,

    /// Purge stale workspaces from the engine root after converting.
    #[arg(long, env = "X2T_PURGE")]
    purge: bool,

    /// Keep the request workspace in the engine root.
    #[arg(long, env = "X2T_KEEP_WORKSPACE")]
    keep_workspace: bool,

    /// Engine load timeout in milliseconds.
    #[arg(long, env = "X2T_INIT_TIMEOUT", default_value_t = 20_000)]
    init_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "X2T_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Classify the input and print its size, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "X2T_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "X2T_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    /// Source → intermediate, normalising legacy formats first.
    ToBin,
    /// Intermediate → target.
    FromBin,
    /// Legacy → modern container only.
    Normalize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.json;
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

    let input = resolve_input(&cli.input).await;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let rep = classify(&input);
        let size = byte_size(&input);
        if cli.json {
            let summary = serde_json::json!({
                "input": cli.input,
                "representation": rep.to_string(),
                "size": size,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
            );
        } else {
            println!("Input:           {}", cli.input);
            println!("Representation:  {}", rep);
            println!("Size:            {}", format_size(size));
        }
        return Ok(());
    }

    // ── Resolve request ──────────────────────────────────────────────────
    let name = cli
        .name
        .clone()
        .unwrap_or_else(|| default_name(&cli.input));
    let from = match cli.from.as_deref().or_else(|| extension_of(&name)) {
        Some(ext) => formats::bare_extension(ext),
        None => bail!("Cannot tell the source format of '{}'; pass --from", name),
    };
    let mode = cli.mode.unwrap_or(if formats::is_intermediate(&from) {
        ModeArg::FromBin
    } else {
        ModeArg::ToBin
    });

    // ── Build converter ──────────────────────────────────────────────────
    let Some(engine) = cli.engine.clone() else {
        bail!("No x2t executable given; pass --engine or set X2T_ENGINE");
    };
    let mut loader = ProcessEngineLoader::new(engine);
    if let Some(root) = &cli.engine_root {
        loader = loader.host_root(root);
    }

    let config = ConverterConfig::builder()
        .init_timeout_ms(cli.init_timeout)
        .download_timeout_secs(cli.download_timeout)
        .retain_workspaces(cli.keep_workspace)
        .build()
        .context("Invalid configuration")?;
    let converter = X2tConverter::new(config, loader).context("Failed to create converter")?;

    // ── Load engine ──────────────────────────────────────────────────────
    let bar = show_progress.then(|| spinner("Engine", "loading x2t…"));
    converter
        .initialize()
        .await
        .context("Failed to load the x2t engine")?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(bar) = &bar {
        bar.set_prefix("Converting");
        bar.set_message(name.clone());
    }
    let result = run(&converter, &cli, mode, input, &name, &from).await;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let result = result?;

    // ── Write outputs ────────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(result.file_name_with_extension()));
    save_output(&result.data, &output_path)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if let Some(dir) = &cli.media_dir {
        write_media(&converter, &result, dir).await?;
    }

    if cli.purge {
        let report = converter
            .purge_working_directory()
            .await
            .context("Failed to purge the working directory")?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "   purged {} entries, {} failures",
                report.removed.len(),
                report.failures.len()
            );
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        let mut summary = serde_json::to_value(&result).context("Failed to serialise result")?;
        summary["output"] = serde_json::Value::from(output_path.display().to_string());
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise result")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  {}  →  {}",
            green("✔"),
            result.description(),
            dim(&format_size(result.size as u64)),
            bold(&output_path.display().to_string()),
        );
        if !result.media.is_empty() {
            eprintln!("   {} {} media files", cyan("◆"), result.media.len());
        }
    }

    Ok(())
}

async fn run(
    converter: &X2tConverter,
    cli: &Cli,
    mode: ModeArg,
    input: Input,
    name: &str,
    from: &str,
) -> Result<ConversionResult> {
    match mode {
        ModeArg::Normalize => converter
            .normalize_legacy(input, name, from)
            .await
            .context("Conversion failed")?
            .with_context(|| format!("'.{from}' is not a legacy format; nothing to normalise")),
        ModeArg::FromBin => converter
            .convert_from_bin(input, name, cli.to.as_deref())
            .await
            .context("Conversion failed"),
        ModeArg::ToBin => match cli.to.as_deref() {
            Some(to) if !formats::is_intermediate(to) => converter
                .convert(input, ConversionRequest::new(name, from, to))
                .await
                .context("Conversion failed"),
            _ => converter
                .convert_to_bin(input, name, from)
                .await
                .context("Conversion failed"),
        },
    }
}

/// Local paths become file handles; anything else is passed on as a string
/// for the library to classify (URL, data URL or literal text).
async fn resolve_input(raw: &str) -> Input {
    match FileHandle::open(raw).await {
        Ok(handle) => Input::File(handle),
        Err(_) => Input::from(raw),
    }
}

/// Last path segment of a path or URL, ignoring query and fragment.
fn default_name(raw: &str) -> String {
    if is_data_url(raw) {
        return "document".to_string();
    }
    let trimmed = raw.split(['?', '#']).next().unwrap_or(raw);
    let last = Path::new(trimmed)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.contains(':'));
    match last {
        Some(n) => n.to_string(),
        None => "document".to_string(),
    }
}

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && !ext.contains(['/', '\\']))
}

async fn write_media(converter: &X2tConverter, result: &ConversionResult, dir: &Path) -> Result<()> {
    for (key, url) in &result.media {
        let Some(entry) = converter.object_urls().resolve(url) else {
            continue;
        };
        let file = key.strip_prefix("media/").unwrap_or(key);
        let path = dir.join(file);
        save_output(&entry.data, &path)
            .await
            .with_context(|| format!("Failed to write media file {}", path.display()))?;
    }
    Ok(())
}
