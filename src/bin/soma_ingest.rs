use std::fs;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use soma_ingest::config::{ConfigLoader, ResolvedConfig};
use soma_ingest::domain::{Axis, ElementType, ObjectType, ParentRef};
use soma_ingest::engine::SomaObject;
use soma_ingest::error::SomaError;
use soma_ingest::ingest::{
    ArrayOptions, FrameOptions, Ingestor, SomaInput, Target, WriteOptions, WriteSummary,
};
use soma_ingest::output::{JsonOutput, OutputMode, TextOutput};
use soma_ingest::store::FilesystemEngine;

#[derive(Parser)]
#[command(name = "soma-ingest")]
#[command(about = "Write single-cell tables and matrices as SOMA data frames and arrays")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a JSON-encoded table or matrix")]
    Write(WriteArgs),
    #[command(about = "Create a collection, experiment, or measurement")]
    Collection(CollectionArgs),
    #[command(about = "Print the default storage root")]
    Root,
}

#[derive(Args, Clone)]
struct TargetArgs {
    #[arg(long)]
    uri: String,

    #[arg(long)]
    parent: Option<String>,

    #[arg(long, value_enum, default_value_t = ObjectType::Collection)]
    parent_type: ObjectType,

    #[arg(long)]
    absolute: bool,
}

#[derive(Args)]
struct WriteArgs {
    input: String,

    #[command(flatten)]
    target: TargetArgs,

    #[arg(long)]
    sparse: Option<bool>,

    #[arg(long)]
    transpose: bool,

    #[arg(long, value_enum)]
    element_type: Option<ElementType>,

    #[arg(long)]
    index_column: Option<String>,

    #[arg(long, value_delimiter = ',')]
    index_column_names: Option<Vec<String>>,

    #[arg(long, value_enum, default_value_t = Axis::Obs)]
    axis: Axis,
}

#[derive(Args)]
struct CollectionArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(long, value_enum, default_value_t = ObjectType::Collection)]
    kind: ObjectType,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SomaError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SomaError) -> u8 {
    match error {
        SomaError::UnsupportedColumns(_)
        | SomaError::MissingIndex(_)
        | SomaError::MissingIndexColumns(_)
        | SomaError::TypeMismatch(_)
        | SomaError::IncompatibleRequest(_)
        | SomaError::Configuration(_)
        | SomaError::InvalidInput(_)
        | SomaError::ConfigRead(_)
        | SomaError::ConfigParse(_) => 2,
        SomaError::AlreadyExists(_) | SomaError::NotFound(_) | SomaError::Storage(_) => 3,
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
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let ingestor = Ingestor::from_config(FilesystemEngine::new(), &config);

    match cli.command {
        Commands::Write(args) => run_write(args, &ingestor, &config, output_mode),
        Commands::Collection(args) => run_collection(args, &ingestor, output_mode),
        Commands::Root => match output_mode {
            OutputMode::Json => JsonOutput::print_root(ingestor.storage_root()).into_diagnostic(),
            OutputMode::Text => {
                println!("{}", ingestor.storage_root());
                Ok(())
            }
        },
    }
}

fn run_write(
    args: WriteArgs,
    ingestor: &Ingestor<FilesystemEngine>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let content = fs::read_to_string(&args.input)
        .map_err(|err| SomaError::Filesystem(format!("read {}: {err}", args.input)))?;
    let input: SomaInput = serde_json::from_str(&content)
        .map_err(|err| SomaError::InvalidInput(format!("{}: {err}", args.input)))?;

    let mut frame = FrameOptions::from_config(config);
    frame.index_column = args.index_column;
    frame.axis = args.axis;
    if let Some(names) = args.index_column_names {
        frame.index_column_names = names;
    }
    let options = WriteOptions {
        frame,
        array: ArrayOptions {
            sparse: args.sparse,
            element_type: args.element_type,
            transpose: args.transpose,
        },
    };

    let artifact = ingestor.write(&input, &build_target(&args.target), &options)?;
    print_summary(&artifact.summary(), output_mode)
}

fn run_collection(
    args: CollectionArgs,
    ingestor: &Ingestor<FilesystemEngine>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let collection = ingestor.create_collection(&build_target(&args.target), args.kind)?;
    let summary = WriteSummary {
        uri: collection.uri().to_string(),
        object_type: collection.object_type(),
        element_type: None,
        shape: Vec::new(),
        columns: Vec::new(),
        index_column_names: Vec::new(),
    };
    print_summary(&summary, output_mode)
}

fn build_target(args: &TargetArgs) -> Target {
    let mut target = Target::new(args.uri.clone());
    if let Some(parent) = &args.parent {
        target = target.under(ParentRef::new(parent.clone(), args.parent_type));
    }
    if args.absolute {
        target = target.absolute();
    }
    target
}

fn print_summary(summary: &WriteSummary, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(summary).into_diagnostic(),
        OutputMode::Text => TextOutput::print_summary(summary).into_diagnostic(),
    }
}
