use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use thiserror::Error;

use epcis_converter::{
    validate_document, ConfigError, Conversion, ConversionError, ConverterConfig,
    ExecutionMode, FallbackCoordinator, RemoteConfig, ReportFormat,
    TransformationReporter,
};
use epcis_converter::reporter::ReportError;

#[derive(Parser, Debug)]
#[command(name = "epcis-converter")]
#[command(about = "Convert EPCIS 1.x XML to EPCIS 2.0 XML and JSON-LD")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base URL of a remote conversion service (overrides the config file)
    #[arg(long, global = true, value_name = "URL")]
    remote_url: Option<String>,

    /// Request timeout in seconds for the remote service
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Never contact the remote service
    #[arg(long, global = true)]
    local: bool,

    /// Print a conversion report (console, json or yaml)
    #[arg(long, global = true, value_name = "FORMAT")]
    report: Option<ReportFormat>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate an EPCIS 1.x XML document to EPCIS 2.0 XML
    ToV2 {
        input: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        xml: XmlFlags,
    },
    /// Project an EPCIS 2.0 XML document to JSON-LD
    ToJsonld {
        input: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        json: JsonFlags,
    },
    /// Convert an EPCIS 1.x XML document straight to JSON-LD
    V1ToJsonld {
        input: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        json: JsonFlags,
    },
    /// Report problems with an EPCIS document without converting it
    Check { input: PathBuf },
    /// Probe the configured remote service
    Ping,
}

#[derive(Args, Debug, Default)]
struct XmlFlags {
    /// Reject input that is not an EPCIS document before migrating
    #[arg(long)]
    validate: bool,

    /// Keep comments from the source document
    #[arg(long)]
    preserve_comments: bool,
}

#[derive(Args, Debug, Default)]
struct JsonFlags {
    /// Emit single-line JSON
    #[arg(long)]
    compact: bool,

    /// Omit the @context member
    #[arg(long)]
    no_context: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("{0}")]
    Failed(String),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("\n❌ Error: {}", e);
        if let CliError::Conversion(ConversionError::Validation(ref validation)) = e {
            if let Some(ref fix) = validation.suggested_fix {
                eprintln!("   {}", fix);
            }
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => ConverterConfig::load(path)?,
        None => ConverterConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let reporter = cli
        .report
        .map(|format| TransformationReporter::new().with_format(format));

    match cli.command {
        Command::ToV2 { input, output, xml } => {
            if xml.validate {
                config.xml.validate_before_transform = true;
            }
            if xml.preserve_comments {
                config.xml.preserve_comments = true;
            }
            let source = read_input(&input)?;
            let coordinator = build_coordinator(&config)?;

            println!("\n=== Migrating to EPCIS 2.0 ===");
            let conversion = coordinator
                .convert_to_v2(&source, &config.xml, config.execution)
                .await?;
            finish("to-v2", &conversion, output, "converted-v2", "xml", reporter.as_ref())
        }
        Command::ToJsonld { input, output, json } => {
            json.apply(&mut config);
            let source = read_input(&input)?;
            let coordinator = build_coordinator(&config)?;

            println!("\n=== Projecting to JSON-LD ===");
            let conversion = coordinator
                .convert_to_jsonld(&source, &config.json_ld, config.execution)
                .await?;
            finish("to-jsonld", &conversion, output, "converted", "jsonld", reporter.as_ref())
        }
        Command::V1ToJsonld { input, output, json } => {
            json.apply(&mut config);
            let source = read_input(&input)?;
            let coordinator = build_coordinator(&config)?;

            println!("\n=== Converting EPCIS 1.x to JSON-LD ===");
            let conversion = coordinator
                .convert_v1_to_jsonld(&source, &config.json_ld, config.execution)
                .await?;
            finish("v1-to-jsonld", &conversion, output, "converted", "jsonld", reporter.as_ref())
        }
        Command::Check { input } => {
            let source = read_input(&input)?;
            let report = validate_document(&source);
            let reporter = reporter.unwrap_or_default();
            println!("{}", reporter.format_validation_report(&report)?);
            if report.is_valid {
                Ok(())
            } else {
                Err(CliError::Failed(format!("{} is not a usable EPCIS document", input.display())))
            }
        }
        Command::Ping => {
            println!("\n=== Remote Service ===");
            let Some(remote) = &config.remote else {
                println!("  ℹ No remote service configured");
                return Ok(());
            };
            let coordinator = build_coordinator(&config)?;
            if coordinator.test_connection().await {
                println!("  ✓ {} is reachable", remote.base_url);
                Ok(())
            } else {
                println!("  ⚠ {} is not reachable", remote.base_url);
                Err(CliError::Failed("remote service did not answer the health probe".to_string()))
            }
        }
    }
}

impl JsonFlags {
    fn apply(&self, config: &mut ConverterConfig) {
        if self.compact {
            config.json_ld.pretty_print = false;
        }
        if self.no_context {
            config.json_ld.include_context = false;
        }
    }
}

fn apply_overrides(config: &mut ConverterConfig, cli: &Cli) {
    if let Some(url) = &cli.remote_url {
        match &mut config.remote {
            Some(remote) => remote.base_url = url.clone(),
            None => config.remote = Some(RemoteConfig::new(url.clone())),
        }
    }
    if let (Some(timeout), Some(remote)) = (cli.timeout, config.remote.as_mut()) {
        remote.timeout_secs = timeout;
    }
    if cli.local {
        config.execution = ExecutionMode::LocalOnly;
    }
}

fn build_coordinator(config: &ConverterConfig) -> Result<FallbackCoordinator, CliError> {
    let coordinator = FallbackCoordinator::from_config(config)?;
    match (&config.remote, config.execution) {
        (Some(remote), ExecutionMode::Auto) => {
            println!("  ℹ Remote service: {} (local engine as fallback)", remote.base_url)
        }
        (Some(_), ExecutionMode::LocalOnly) => {
            println!("  ℹ Remote service configured but local execution requested")
        }
        (None, _) => println!("  ℹ Using local engine"),
    }
    Ok(coordinator)
}

fn read_input(path: &Path) -> Result<String, CliError> {
    debug!("Reading {}", path.display());
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn finish(
    name: &str,
    conversion: &Conversion,
    output: Option<PathBuf>,
    default_stem: &str,
    extension: &str,
    reporter: Option<&TransformationReporter>,
) -> Result<(), CliError> {
    for step in &conversion.steps {
        if let Some(ref failure) = step.remote_failure {
            println!("  ⚠ Remote {} failed, used local engine: {}", step.operation, failure);
        } else {
            println!("  ✓ {} completed on {} backend", step.operation, step.backend);
        }
    }

    let output_file = output.unwrap_or_else(|| get_unique_filename(default_stem, extension));
    fs::write(&output_file, &conversion.output).map_err(|source| CliError::Write {
        path: output_file.display().to_string(),
        source,
    })?;

    if let Some(reporter) = reporter {
        let report = reporter.generate_report(name, conversion);
        println!("\n{}", reporter.format_report(&report)?);
    }

    println!("\n=== Conversion Complete ===");
    println!("  ✓ Output file: {}", output_file.display());
    Ok(())
}

// Check for file existence and create a unique filename
fn get_unique_filename(stem: &str, extension: &str) -> PathBuf {
    let mut count = 0;
    let mut file_name = PathBuf::from(format!("{}.{}", stem, extension));

    while file_name.exists() {
        count += 1;
        file_name = PathBuf::from(format!("{}-{}.{}", stem, count, extension));
    }

    file_name
}
