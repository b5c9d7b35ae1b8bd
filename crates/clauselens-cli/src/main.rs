mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use clauselens_client::{AnalysisLookup, ApiClient};
use clauselens_core::{AnalysisKind, AnalysisRequest, AnalysisResult, Finding};
use clauselens_session::{AnalysisObserver, StreamingAnalysisController, VersionResolver};
use clauselens_store::FileStore;
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(name = "clauselens", version)]
#[command(about = "Contract review against a versioned negotiation playbook")]
struct Cli {
    /// Base URL of the analysis service.
    #[arg(
        long,
        global = true,
        env = "CLAUSELENS_API_BASE",
        default_value = "http://localhost:8000"
    )]
    api_base: String,

    /// Where the active playbook version is remembered between runs.
    #[arg(
        long,
        global = true,
        env = "CLAUSELENS_STATE_FILE",
        default_value = ".clauselens/state.json"
    )]
    state_file: PathBuf,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a contract and stream findings as they arrive.
    Analyze {
        file: PathBuf,
        #[arg(long, default_value_t = AnalysisKind::Risks)]
        kind: AnalysisKind,
        /// Playbook version to analyze against. Defaults to the active one.
        #[arg(long)]
        playbook_version: Option<String>,
    },
    /// Show a stored analysis.
    Show { analysis_id: String },
    /// Manage playbook versions.
    Playbook {
        #[command(subcommand)]
        command: PlaybookCommand,
    },
}

#[derive(Subcommand)]
enum PlaybookCommand {
    /// List versions, newest first. The active one is marked with `*`.
    List,
    /// Print a version's content. Defaults to the active version.
    Show { version_id: Option<String> },
    /// Make a version active for future analyses.
    Use { version_id: String },
    /// Save a playbook file as a new version and make it active.
    Save {
        file: PathBuf,
        #[arg(long)]
        note: Option<String>,
    },
    /// Rebuild the retrieval index of a version.
    Reindex { version_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    info!("clauselens v{}", env!("CARGO_PKG_VERSION"));

    let client = ApiClient::new(cli.api_base.as_str());
    match cli.command {
        Command::Analyze {
            file,
            kind,
            playbook_version,
        } => analyze(client, &cli.state_file, &file, kind, playbook_version).await,
        Command::Show { analysis_id } => show(&client, &analysis_id).await,
        Command::Playbook { command } => playbook(client, &cli.state_file, command).await,
    }
}

async fn analyze(
    client: ApiClient,
    state_file: &Path,
    file: &Path,
    kind: AnalysisKind,
    playbook_version: Option<String>,
) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;

    // The version is fixed here; later activations do not touch this job.
    let playbook_version = match playbook_version {
        Some(id) => Some(id),
        None => {
            let mut resolver = VersionResolver::new(client.clone(), FileStore::open(state_file));
            match resolver.load(None).await {
                Ok(()) => resolver.active_id().map(str::to_string),
                Err(e) => {
                    warn!(error = %e, "could not resolve playbook version, using service default");
                    None
                }
            }
        }
    };

    let request = AnalysisRequest::new(text, kind).with_playbook_version(playbook_version);
    let mut controller =
        StreamingAnalysisController::new(client).with_observer(Arc::new(ProgressPrinter));
    let analysis_id = controller
        .run(&request)
        .await
        .context("submitting analysis")?;
    eprintln!(
        "Analysis {analysis_id} submitted (playbook {})",
        request.playbook_version_id.as_deref().unwrap_or("default")
    );

    let job = tokio::select! {
        job = controller.wait() => job,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted; the analysis keeps running on the service.");
            eprintln!("Run `clauselens show {analysis_id}` to fetch it later.");
            return Ok(());
        }
    };
    let job = job.context("analysis was not attached")?;

    match job.result() {
        Some(result) => {
            println!();
            display::print_result_card(result);
            Ok(())
        }
        None => {
            if !job.findings().is_empty() {
                println!();
                display::print_partial_findings(job.findings());
            }
            bail!(
                "analysis {} stopped without a result: {}",
                job.id(),
                job.stop_reason().unwrap_or("unknown reason")
            )
        }
    }
}

async fn show(client: &ApiClient, analysis_id: &str) -> anyhow::Result<()> {
    let lookup = client
        .fetch_analysis(analysis_id)
        .await
        .with_context(|| format!("fetching analysis {analysis_id}"))?;
    match lookup {
        AnalysisLookup::Complete(result) => display::print_result_card(&result),
        AnalysisLookup::Pending {
            analysis_id,
            status,
        } => println!("Analysis {analysis_id} is {status}; no result yet."),
    }
    Ok(())
}

async fn playbook(
    client: ApiClient,
    state_file: &Path,
    command: PlaybookCommand,
) -> anyhow::Result<()> {
    let mut resolver = VersionResolver::new(client, FileStore::open(state_file));

    match command {
        PlaybookCommand::List => {
            resolver.load(None).await.context("listing playbook versions")?;
            display::print_versions(resolver.versions(), resolver.active_id());
        }
        PlaybookCommand::Show { version_id } => {
            resolver.load(None).await.context("listing playbook versions")?;
            let version = match version_id.as_deref() {
                Some(id) => resolver.versions().iter().find(|v| v.id == id),
                None => resolver.active(),
            };
            match (version, version_id) {
                (Some(version), _) => display::print_version(version, resolver.active_id()),
                (None, Some(id)) => bail!("no playbook version `{id}`"),
                (None, None) => bail!("no playbook versions on the service"),
            }
        }
        PlaybookCommand::Use { version_id } => {
            resolver.load(None).await.context("listing playbook versions")?;
            if !resolver.activate(&version_id) {
                bail!("no playbook version `{version_id}`");
            }
            println!("Active playbook version: {version_id}");
        }
        PlaybookCommand::Save { file, note } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let version_id = resolver
                .create_version(&content, note.as_deref())
                .await
                .context("saving playbook version")?;
            println!("Saved playbook version {version_id} (now active)");
        }
        PlaybookCommand::Reindex { version_id } => {
            resolver
                .reindex(&version_id)
                .await
                .with_context(|| format!("reindexing playbook version {version_id}"))?;
            println!("Reindexed playbook version {version_id}");
        }
    }
    Ok(())
}

/// Prints stream progress as it arrives.
struct ProgressPrinter;

impl AnalysisObserver for ProgressPrinter {
    fn on_status(&self, _analysis_id: &str, message: &str) {
        eprintln!("  ... {message}");
    }

    fn on_finding_appended(&self, _analysis_id: &str, finding: &Finding) {
        println!("{}", display::finding_line(finding));
    }

    fn on_complete(&self, _analysis_id: &str, result: &AnalysisResult) {
        eprintln!("  ... complete, {} findings", result.findings.len());
    }
}
