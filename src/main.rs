use clap::{Parser, Subcommand};
use intake_compose::{
    ComposeError, ComposerConfig, GridOptions, IntakeSubmission, JsonDirStore, OutboxDir,
    TemplateAsset, contract, data_reference_from_file, inspect_template_path, render_grid_pdf,
    submit_and_notify,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "intake-compose")]
#[command(author, version, about = "Clinical intake packet composer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compose the intake PDF for a submission JSON file
    Compose {
        /// Submission JSON: { firstName, lastName, dob, formData }
        #[arg(long)]
        submission: PathBuf,
        /// Template PDF (default: INTAKE_TEMPLATE_PATH)
        #[arg(long)]
        template: Option<PathBuf>,
        /// Output PDF path
        #[arg(short, long)]
        out: PathBuf,
        /// Print build metrics as JSON
        #[arg(long)]
        metrics: bool,
    },
    /// Persist, compose and queue the intake email for a submission
    Submit {
        #[arg(long)]
        submission: PathBuf,
        #[arg(long)]
        template: Option<PathBuf>,
    },
    /// Report pages, sizes and form fields of a template PDF
    Inspect {
        pdf: PathBuf,
    },
    /// Stamp a labelled coordinate grid onto template pages
    Grid {
        #[arg(long)]
        template: Option<PathBuf>,
        #[arg(short, long)]
        out: PathBuf,
        /// 1-indexed pages to grid, comma separated (default: 2,3,4)
        #[arg(long, value_delimiter = ',')]
        pages: Option<Vec<usize>>,
        /// Outline every overlay mapping box
        #[arg(long)]
        mappings: bool,
    },
    /// Print a data reference for a PNG or JPEG signature image
    EncodeSignature {
        image: PathBuf,
        /// Re-encode as JPEG
        #[arg(long)]
        jpeg: bool,
    },
    /// Print the form contract fingerprint and check its tables
    Contract,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_config(template: Option<PathBuf>) -> Result<ComposerConfig, ComposeError> {
    let mut config = ComposerConfig::from_env()?;
    if let Some(path) = template {
        config.template_path = path;
    }
    Ok(config)
}

fn read_submission(path: &Path) -> Result<IntakeSubmission, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(IntakeSubmission::from_json(&text)?)
}

fn compose(submission: &Path, template: Option<PathBuf>, out: &Path, metrics: bool) -> CliResult {
    let config = load_config(template)?;
    let composer = config.build_composer()?;
    let submission = read_submission(submission)?;
    let (bytes, build_metrics) = composer.build_with_metrics(&submission)?;
    std::fs::write(out, &bytes)?;
    println!("Wrote {} ({} pages, {} bytes)", out.display(), build_metrics.total_pages, build_metrics.bytes);
    if metrics {
        println!("{}", serde_json::to_string_pretty(&build_metrics)?);
    }
    Ok(())
}

fn submit(submission: &Path, template: Option<PathBuf>) -> CliResult {
    let config = load_config(template)?;
    let composer = config.build_composer()?;
    let submission = read_submission(submission)?;
    let store = JsonDirStore::new(&config.store_dir);
    let outbox = OutboxDir::new(&config.outbox_dir);
    let receipt = submit_and_notify(&store, &composer, &outbox, &submission, &config.mail)?;
    println!("{}", serde_json::to_string(&receipt)?);
    Ok(())
}

fn inspect(pdf: &Path) -> CliResult {
    let report = inspect_template_path(pdf)?;
    println!("PDF {} ({} bytes)", report.pdf_version, report.file_size_bytes);
    println!("sha256: {}", report.sha256);
    println!("encrypted: {}", report.encrypted);
    println!("pages: {}", report.page_count);
    for (idx, size) in report.page_sizes.iter().enumerate() {
        match size {
            Some((w, h)) => println!("  page {}: {} x {}", idx + 1, w, h),
            None => println!("  page {}: unknown size", idx + 1),
        }
    }
    println!("Found {} fields:", report.form_fields.len());
    for field in &report.form_fields {
        println!("- {} ({})", field.name, field.field_type);
    }
    let issues = report.composition_issues();
    if issues.is_empty() {
        println!("compatible: yes");
    } else {
        let codes: Vec<&str> = issues.iter().map(|i| i.as_str()).collect();
        println!("compatible: {} [{}]", if report.is_compatible() { "yes" } else { "no" }, codes.join(", "));
    }
    Ok(())
}

fn grid(template: Option<PathBuf>, out: &Path, pages: Option<Vec<usize>>, mappings: bool) -> CliResult {
    let config = load_config(template)?;
    let mut asset = TemplateAsset::from_path(config.template_path);
    if let Some(sha256) = config.template_sha256 {
        asset = asset.with_sha256(sha256);
    }
    let mut options = GridOptions {
        outline_mappings: mappings,
        ..GridOptions::default()
    };
    if let Some(pages) = pages {
        options.pages = pages;
    }
    let composed = render_grid_pdf(&asset, &options)?;
    std::fs::write(out, &composed.bytes)?;
    println!("Created {}", out.display());
    Ok(())
}

fn print_contract() -> CliResult {
    let meta = contract::metadata();
    println!("{} {}", meta.contract_id, meta.contract_version);
    println!("fingerprint: {}", meta.contract_fingerprint_sha256);
    println!("mappings: {}, signers: {}", meta.mapping_count, meta.signer_count);
    let violations = contract::validate_contract();
    if violations.is_empty() {
        return Ok(());
    }
    for violation in &violations {
        eprintln!("- {}", violation);
    }
    Err(Box::new(ComposeError::Configuration(format!(
        "form contract has {} violation(s)",
        violations.len()
    ))))
}

fn run(cli: Cli) -> CliResult {
    match cli.command {
        Commands::Compose {
            submission,
            template,
            out,
            metrics,
        } => compose(&submission, template, &out, metrics),
        Commands::Submit {
            submission,
            template,
        } => submit(&submission, template),
        Commands::Inspect { pdf } => inspect(&pdf),
        Commands::Grid {
            template,
            out,
            pages,
            mappings,
        } => grid(template, &out, pages, mappings),
        Commands::EncodeSignature { image, jpeg } => {
            println!("{}", data_reference_from_file(&image, jpeg)?);
            Ok(())
        }
        Commands::Contract => print_contract(),
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let is_submit = matches!(cli.command, Commands::Submit { .. });
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_submit => {
            eprintln!("submission failed: {}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
