//! exifgate CLI - Extract metadata from files and HTTP responses
//!
//! Usage:
//!   exifgate extract <files>... [--html] [--http] [--format <format>]
//!   exifgate check <file> [--http] [--mime <type>]
//!
//! Examples:
//!   exifgate extract photo.jpg
//!   exifgate extract response.bin --http --ignore-line Warning
//!   exifgate extract a.jpg b.png --format json
//!   exifgate check response.bin --http

use clap::{Parser, Subcommand, ValueEnum};
use exifgate::config::Settings;
use exifgate::gateway::{
    passes_type_gate, sniff_mime_type, MetadataExtractor, MetadataGateway, ResponseInfo,
};
use exifgate::worker::Mode;
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "exifgate")]
#[command(about = "exifgate - Extract file metadata through a long-running exiftool process")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to exifgate.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract metadata from one or more files
    Extract {
        /// Files to read
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Request HTML-formatted output
        #[arg(long)]
        html: bool,

        #[command(flatten)]
        input: InputArgs,

        /// Additional MIME types to skip
        #[arg(long = "ignore-type")]
        ignore_types: Vec<String>,

        /// Additional result fields to drop
        #[arg(long = "ignore-line")]
        ignore_lines: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Report whether a file would be sent to exiftool
    Check {
        /// File to inspect
        file: PathBuf,

        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(clap::Args, Clone)]
struct InputArgs {
    /// Treat files as raw HTTP responses (headers + body)
    #[arg(long)]
    http: bool,

    /// Declared MIME type (overrides Content-Type)
    #[arg(short, long)]
    mime: Option<String>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One metadata line per output line
    Text,
    /// JSON array of per-file results
    Json,
}

#[derive(Serialize)]
struct FileReport {
    file: String,
    response: ResponseInfo,
    lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            print_error("Error loading configuration", &e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = exifgate::logging::init(&settings.logging) {
        eprintln!("Warning: {}", e);
    }

    match cli.command {
        Commands::Extract {
            files,
            html,
            input,
            ignore_types,
            ignore_lines,
            format,
        } => {
            let mode = if html { Mode::Html } else { Mode::Plain };
            cmd_extract(settings, files, mode, input, ignore_types, ignore_lines, format).await
        }
        Commands::Check { file, input } => cmd_check(settings, file, input).await,
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, exifgate::config::SettingsError> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

/// Print an error and its cause chain.
fn print_error(prefix: &str, err: &dyn Error) {
    eprintln!("{}: {}", prefix, err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

/// Describe a file the way an intercepting host would.
fn describe(file: &Path, bytes: &[u8], input: &InputArgs) -> ResponseInfo {
    let mut info = if input.http {
        ResponseInfo::from_http(bytes)
    } else {
        let mut info = ResponseInfo::body();
        info.stated_mime_type = mime_guess::from_path(file)
            .first()
            .map(|m| m.essence_str().to_string());
        info.inferred_mime_type = sniff_mime_type(bytes).map(str::to_string);
        info
    };

    if let Some(mime) = &input.mime {
        info.stated_mime_type = Some(mime.to_ascii_lowercase());
    }
    info
}

async fn cmd_extract(
    mut settings: Settings,
    files: Vec<PathBuf>,
    mode: Mode,
    input: InputArgs,
    ignore_types: Vec<String>,
    ignore_lines: Vec<String>,
    format: OutputFormat,
) -> ExitCode {
    settings.ignore.types.extend(ignore_types);
    settings.ignore.lines.extend(ignore_lines);

    // Read the files
    let mut responses = Vec::with_capacity(files.len());
    for file in &files {
        match tokio::fs::read(file).await {
            Ok(bytes) => {
                let info = describe(file, &bytes, &input);
                responses.push((bytes, info));
            }
            Err(e) => {
                eprintln!("Error reading file '{}': {}", file.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    let gateway = match MetadataGateway::start(&settings).await {
        Ok(gateway) => gateway,
        Err(e) => {
            print_error("Cannot start exiftool", &e);
            return ExitCode::FAILURE;
        }
    };

    let results = gateway.extract_batch(&responses, mode).await;
    gateway.shutdown().await;

    let mut failed = false;
    let reports: Vec<FileReport> = files
        .iter()
        .zip(responses)
        .zip(results)
        .map(|((file, (_, response)), result)| {
            let (lines, error) = match result {
                Ok(lines) => (lines, None),
                Err(e) => {
                    failed = true;
                    print_error(&format!("Error extracting '{}'", file.display()), &e);
                    (Vec::new(), Some(e.to_string()))
                }
            };
            FileReport {
                file: file.display().to_string(),
                response,
                lines,
                error,
            }
        })
        .collect();

    match format {
        OutputFormat::Text => {
            let multiple = reports.len() > 1;
            for report in &reports {
                if multiple {
                    println!("==> {} <==", report.file);
                }
                for line in &report.lines {
                    println!("{}", line);
                }
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn cmd_check(settings: Settings, file: PathBuf, input: InputArgs) -> ExitCode {
    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let info = describe(&file, &bytes, &input);
    let ignored: HashSet<String> = settings.ignore.types.into_iter().collect();

    println!("File: {}", file.display());
    println!("Body offset: {}", info.body_offset);
    println!("Stated type: {}", info.stated_mime_type.as_deref().unwrap_or("-"));
    println!("Inferred type: {}", info.inferred_mime_type.as_deref().unwrap_or("-"));

    if passes_type_gate(&ignored, &info) {
        println!("OK: would be sent to exiftool");
    } else {
        println!("Skipped: MIME type is ignored");
    }
    ExitCode::SUCCESS
}
