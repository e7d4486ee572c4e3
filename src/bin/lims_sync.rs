use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use lims_sync::catalogue::CatalogueHttpClient;
use lims_sync::config::{ConfigLoader, ResolvedConfig, Secrets, load_blacklist};
use lims_sync::domain::Blacklist;
use lims_sync::error::SyncError;
use lims_sync::lims::LimsHttpClient;
use lims_sync::mapper::Mapper;
use lims_sync::output::{HumanOutput, JsonOutput, OutputMode};
use lims_sync::sync::{ProgressSink, SyncSettings, Synchronizer, TransferOptions};

#[derive(Parser)]
#[command(name = "lims-sync")]
#[command(about = "Mirror LIMS experiments, samples and datasets into a research-data catalogue")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Transfer an experiment, sample or dataset and everything below it")]
    Transfer(TransferArgs),
    #[command(about = "Create catalogue sample types from the LIMS sample types")]
    SampleTypes(SampleTypesArgs),
}

#[derive(Args)]
struct TransferArgs {
    /// Path identifier or perm id of the LIMS object.
    identifier: String,

    /// Upload file contents instead of linking to the LIMS.
    #[arg(long)]
    data: bool,

    /// File with one dataset perm id per line to leave out.
    #[arg(long)]
    blacklist: Option<String>,

    /// Always create new resources, never update those from earlier runs.
    #[arg(long)]
    no_update: bool,
}

#[derive(Args)]
struct SampleTypesArgs {
    /// Create types even when one with the same title exists.
    #[arg(long)]
    ignore_existing: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::AmbiguousMatch { .. } => 4,
        SyncError::SourceNotFound(_) => 2,
        SyncError::LimsHttp(_)
        | SyncError::LimsStatus { .. }
        | SyncError::CatalogueHttp(_)
        | SyncError::CatalogueStatus { .. }
        | SyncError::Upload { .. }
        | SyncError::MalformedResponse(_) => 3,
        error if error.is_configuration() => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let synchronizer = build_synchronizer(&config)?;

    match cli.command {
        Commands::Transfer(args) => run_transfer(args, &synchronizer, output_mode),
        Commands::SampleTypes(args) => run_sample_types(args, &synchronizer, output_mode),
    }
}

fn build_synchronizer(
    config: &ResolvedConfig,
) -> miette::Result<Synchronizer<LimsHttpClient, CatalogueHttpClient>> {
    let secrets = Secrets::from_env()?;
    let lims = LimsHttpClient::new(&config.lims.url, &config.lims.dss_url, &secrets.lims_token)?;
    let catalogue = CatalogueHttpClient::new(
        &config.catalogue.url,
        &config.catalogue.user,
        &secrets.catalogue_password,
    )?;
    let mapper = Mapper::new().with_asset_categories(config.asset_categories.clone());
    Ok(Synchronizer::new(
        lims,
        catalogue,
        mapper,
        SyncSettings::from_config(config),
    ))
}

fn sink_for(output_mode: OutputMode) -> Box<dyn ProgressSink> {
    match output_mode {
        OutputMode::Human => Box::new(HumanOutput),
        OutputMode::Json => Box::new(JsonOutput),
    }
}

fn run_transfer(
    args: TransferArgs,
    synchronizer: &Synchronizer<LimsHttpClient, CatalogueHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let blacklist = match &args.blacklist {
        Some(path) => load_blacklist(path)?,
        None => Blacklist::default(),
    };
    let options = TransferOptions {
        transfer_data: args.data,
        blacklist,
        update_existing: !args.no_update,
    };

    let sink = sink_for(output_mode);
    let report = synchronizer.transfer_object(&args.identifier, &options, sink.as_ref())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_transfer(&report).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_transfer(&report),
    }
    Ok(())
}

fn run_sample_types(
    args: SampleTypesArgs,
    synchronizer: &Synchronizer<LimsHttpClient, CatalogueHttpClient>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sink = sink_for(output_mode);
    let report = synchronizer.transfer_sample_types(args.ignore_existing, sink.as_ref())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_sample_types(&report).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_sample_types(&report),
    }
    Ok(())
}
