use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::config::Config;
use crate::delivery::probe::{reorder_by_liveness, PROBE_TIMEOUT};
use crate::delivery::{DeliveryOrchestrator, DeliverySession, HttpGenerator, Operation, Outcome};
use crate::sink::Presentation;
use crate::worksheet::{FillMode, Layout, Orientation, PageComposer, StrokeStyle, WorksheetOptions};

#[derive(Parser, Debug)]
#[command(name = "propisi")]
#[command(about = "Handwriting practice worksheet generator")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the remote generation API
    Serve,
    /// Render a preview of the first lines through the endpoint roster
    Preview {
        #[command(flatten)]
        worksheet: WorksheetArgs,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
    /// Generate the worksheet, composing locally if every endpoint fails
    Generate {
        #[command(flatten)]
        worksheet: WorksheetArgs,
        #[command(flatten)]
        delivery: DeliveryArgs,
        /// Split text that does not fit one page across several pages
        #[arg(long)]
        paginate: bool,
    },
}

/// Worksheet fields, named after their multipart counterparts.
#[derive(Args, Debug, Clone)]
pub struct WorksheetArgs {
    /// Task line printed at the top of the page
    #[arg(long)]
    pub task: String,

    /// Practice text; lines map to rows
    #[arg(long, conflicts_with = "text_file")]
    pub text: Option<String>,

    /// Read the practice text from a file
    #[arg(long)]
    pub text_file: Option<PathBuf>,

    /// all, first_letter or one_line
    #[arg(long, default_value = "all")]
    pub fill_type: FillMode,

    /// lines, lines_oblique or cells
    #[arg(long, default_value = "lines")]
    pub layout: Layout,

    /// black, gray or punktir
    #[arg(long, default_value = "gray")]
    pub style: StrokeStyle,

    /// portrait or landscape
    #[arg(long, default_value = "portrait")]
    pub orientation: Orientation,

    /// Student name printed under the task
    #[arg(long)]
    pub student_name: Option<String>,
}

impl WorksheetArgs {
    pub fn to_options(&self) -> Result<WorksheetOptions> {
        let text = match (&self.text, &self.text_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read text file {}", path.display()))?,
            (None, None) => String::new(),
        };
        let options = WorksheetOptions::new(
            self.task.clone(),
            text,
            self.fill_type,
            self.layout,
            self.style,
            self.orientation,
        )
        .with_context(|| "invalid worksheet options")?;
        match &self.student_name {
            Some(name) => options
                .with_student_name(name.clone())
                .with_context(|| "invalid worksheet options"),
            None => Ok(options),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeliveryArgs {
    /// Where to save the artifact (defaults to OUTPUT_DIR)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Probe endpoints first and try live ones before the rest
    #[arg(long)]
    pub probe: bool,
}

/// Runs `preview` or `generate` and saves the artifact.
pub async fn deliver(command: Command, config: &Config) -> Result<()> {
    let (op, worksheet, delivery, paginate) = match command {
        Command::Preview {
            worksheet,
            delivery,
        } => (Operation::Preview, worksheet, delivery, false),
        Command::Generate {
            worksheet,
            delivery,
            paginate,
        } => (Operation::Generate, worksheet, delivery, paginate),
        Command::Serve => bail!("serve is not a delivery command"),
    };

    let options = worksheet.to_options()?;
    let composer = PageComposer::new(config.font()?);
    let http = HttpGenerator::default();

    let mut roster = config.roster()?;
    if delivery.probe {
        roster = reorder_by_liveness(http.client(), &roster, PROBE_TIMEOUT).await;
    }

    let orchestrator = DeliveryOrchestrator::new(Arc::new(http), Arc::new(composer))
        .with_timeouts(config.timeouts())
        .with_min_payload_bytes(config.min_payload_bytes)
        .with_pagination(paginate);
    let session = DeliverySession::new(Arc::new(orchestrator), roster);
    debug!(operation = %op, timeout = ?config.timeout_for(op), "starting delivery");

    let outcome = tokio::select! {
        outcome = session.run(op, &options) => outcome.context("invalid worksheet options")??,
        _ = tokio::signal::ctrl_c() => {
            session.cancel(op);
            bail!("{op} cancelled");
        }
    };

    let dir = delivery.output_dir.unwrap_or_else(|| config.output_dir.clone());
    let path = finish(op, outcome, &dir)?;
    println!("{}", path.display());
    Ok(())
}

/// Saves an applied artifact, or turns a failure into its full report.
fn finish(op: Operation, outcome: Outcome, dir: &Path) -> Result<PathBuf> {
    match outcome {
        Outcome::Applied(Presentation::Ready(artifact)) => {
            debug!(
                preview = %artifact.preview_path().display(),
                media_type = artifact.media_type().as_str(),
                size = artifact.bytes().len(),
                "artifact ready"
            );
            let path = match op {
                Operation::Preview => artifact.save_as(dir, "preview")?,
                Operation::Generate => artifact.save(dir)?,
            };
            info!(source = %artifact.source(), "saved {}", path.display());
            Ok(path)
        }
        Outcome::Applied(Presentation::Failed(failure)) => bail!(failure.report()),
        Outcome::Stale => bail!("{op} was superseded before it completed"),
    }
}
