use std::path::Path;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use nf_annotate::annotations::AnnotationSnapshot;
use nf_annotate::app::{App, ClassifyRequest, ManifestOptions, ManifestRequest, ProgressSink};
use nf_annotate::config::{ConfigLoader, ResolvedConfig};
use nf_annotate::domain::{OutputKind, SynapseId, Workflow};
use nf_annotate::error::AnnotatorError;
use nf_annotate::output::{JsonOutput, LogProgress};
use nf_annotate::query::{IndexFilter, IndexRow};
use nf_annotate::schema::{JsonLdSchema, SchemaSource};
use nf_annotate::synapse::{Activity, EntityHeader, SynapseClient, SynapseHttpClient};
use nf_annotate::table::TableSource;

#[derive(Parser)]
#[command(name = "nf-annotate")]
#[command(about = "Derive Synapse annotation manifests for nf-core pipeline outputs")]
#[command(version, author)]
struct Cli {
    /// Config file (default: nf-annotate.json in the current directory, if present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Fileview indexing the pipeline outputs (overrides config)
    #[arg(long, global = true)]
    fileview: Option<SynapseId>,

    /// Log progress phases to stderr
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Parse a sample sheet and print input records")]
    Samplesheet(SampleSheetArgs),
    #[command(about = "Classify pipeline outputs by kind")]
    Classify(ClassifyArgs),
    #[command(about = "Build annotation manifests and optionally submit them")]
    Manifest(ManifestArgs),
}

#[derive(Args)]
struct SampleSheetArgs {
    /// Local CSV/TSV path or Synapse id of the sample sheet
    source: TableSource,
}

#[derive(Args, Clone)]
struct ClassifyArgs {
    #[arg(long)]
    output_root: SynapseId,

    #[arg(long, value_enum)]
    workflow: Workflow,

    /// Restrict to these output kinds (repeatable)
    #[arg(long = "kind", value_enum)]
    kinds: Vec<OutputKind>,
}

#[derive(Args)]
struct ManifestArgs {
    #[arg(long)]
    samplesheet: TableSource,

    #[command(flatten)]
    classify: ClassifyArgs,

    #[arg(long)]
    workflow_link: String,

    /// JSON-LD data model path or URL (overrides config)
    #[arg(long)]
    schema: Option<String>,

    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    submit: bool,

    #[arg(long)]
    provenance: bool,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<AnnotatorError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AnnotatorError) -> u8 {
    match error {
        AnnotatorError::InvalidIdentifier(_)
        | AnnotatorError::AmbiguousIdentifier(_)
        | AnnotatorError::SampleSheetParse(_)
        | AnnotatorError::UnlinkedSample { .. }
        | AnnotatorError::UnknownOutputKind(_)
        | AnnotatorError::UnsupportedOutputKind { .. }
        | AnnotatorError::MissingConfig
        | AnnotatorError::ConfigRead(_)
        | AnnotatorError::ConfigParse(_)
        | AnnotatorError::MissingAuthToken
        | AnnotatorError::Schema(_) => 2,
        AnnotatorError::SynapseHttp(_) | AnnotatorError::SynapseStatus { .. } => 3,
        AnnotatorError::KindFailures { .. } => 4,
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
    let mut config = ConfigLoader::resolve_or_default(cli.config.as_deref())?;
    if let Some(fileview) = cli.fileview {
        config.fileview = Some(fileview);
    }

    match cli.command {
        Commands::Samplesheet(args) => run_samplesheet(args, config, cli.progress),
        Commands::Classify(args) => {
            let client = SynapseHttpClient::new(&config.endpoint)?;
            run_classify(args, App::new(client, NopSchema, config), cli.progress)
        }
        Commands::Manifest(args) => {
            if let Some(schema) = &args.schema {
                config.schema = Some(schema.clone());
            }
            let schema = JsonLdSchema::load(config.require_schema()?)?;
            let client = SynapseHttpClient::new(&config.endpoint)?;
            run_manifest(args, App::new(client, schema, config), cli.progress)
        }
    }
}

fn run_samplesheet(
    args: SampleSheetArgs,
    config: ResolvedConfig,
    progress: bool,
) -> miette::Result<()> {
    let result = match &args.source {
        TableSource::Local(_) => {
            let app = App::new(NopSynapse, NopSchema, config);
            app.samplesheet(&args.source, sink(progress))?
        }
        TableSource::Synapse(_) => {
            let client = SynapseHttpClient::new(&config.endpoint)?;
            let app = App::new(client, NopSchema, config);
            app.samplesheet(&args.source, sink(progress))?
        }
    };
    JsonOutput::print_samplesheet(&result).into_diagnostic()?;
    Ok(())
}

fn run_classify<C: SynapseClient, S: SchemaSource>(
    args: ClassifyArgs,
    app: App<C, S>,
    progress: bool,
) -> miette::Result<()> {
    let result = app.classify(&classify_request(args), sink(progress))?;
    JsonOutput::print_classify(&result).into_diagnostic()?;
    if !result.classification.failures.is_empty() {
        let kinds = result
            .classification
            .failures
            .iter()
            .map(|failure| failure.kind.to_string())
            .collect();
        return Err(AnnotatorError::KindFailures { kinds }.into());
    }
    Ok(())
}

fn run_manifest<C: SynapseClient, S: SchemaSource>(
    args: ManifestArgs,
    app: App<C, S>,
    progress: bool,
) -> miette::Result<()> {
    let ManifestArgs {
        samplesheet,
        classify,
        workflow_link,
        schema: _,
        out_dir,
        submit,
        provenance,
        dry_run,
    } = args;

    let request = ManifestRequest {
        samplesheet,
        classify: classify_request(classify),
        workflow_link,
    };
    let options = ManifestOptions {
        out_dir,
        submit,
        provenance,
        dry_run,
    };
    let result = app.manifest(&request, &options, sink(progress))?;
    JsonOutput::print_manifest(&result).into_diagnostic()?;

    let failed = result.failed_kinds();
    if !failed.is_empty() {
        return Err(AnnotatorError::KindFailures { kinds: failed }.into());
    }
    Ok(())
}

fn classify_request(args: ClassifyArgs) -> ClassifyRequest {
    ClassifyRequest {
        output_root: args.output_root,
        workflow: args.workflow,
        kinds: args.kinds,
    }
}

fn sink(progress: bool) -> &'static dyn ProgressSink {
    if progress {
        &LogProgress as &dyn ProgressSink
    } else {
        &JsonOutput
    }
}

struct NopSchema;

impl SchemaSource for NopSchema {
    fn template_properties(&self, template: &str) -> Result<Vec<String>, AnnotatorError> {
        Err(AnnotatorError::Schema(format!(
            "no schema loaded for template {template}"
        )))
    }
}

struct NopSynapse;

impl NopSynapse {
    fn unavailable<T>() -> Result<T, AnnotatorError> {
        Err(AnnotatorError::SynapseHttp(
            "Synapse access is not configured for this command".to_string(),
        ))
    }
}

impl SynapseClient for NopSynapse {
    fn entity_header(&self, _id: &SynapseId) -> Result<EntityHeader, AnnotatorError> {
        Self::unavailable()
    }

    fn query_files(
        &self,
        _fileview: &SynapseId,
        _filter: &IndexFilter,
    ) -> Result<Vec<IndexRow>, AnnotatorError> {
        Self::unavailable()
    }

    fn get_annotations(&self, _id: &SynapseId) -> Result<AnnotationSnapshot, AnnotatorError> {
        Self::unavailable()
    }

    fn set_annotations(&self, _snapshot: &AnnotationSnapshot) -> Result<(), AnnotatorError> {
        Self::unavailable()
    }

    fn download_file(&self, _id: &SynapseId, _destination: &Path) -> Result<(), AnnotatorError> {
        Self::unavailable()
    }

    fn create_activity(&self, _activity: &Activity) -> Result<String, AnnotatorError> {
        Self::unavailable()
    }

    fn set_generated_by(&self, _id: &SynapseId, _activity_id: &str) -> Result<(), AnnotatorError> {
        Self::unavailable()
    }
}
