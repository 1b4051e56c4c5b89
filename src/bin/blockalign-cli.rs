use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use uuid::Uuid;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use blockalign::logging;
use blockalign::{Aligner, AlignmentResult, Dataset, MemoryStore, Opts, Stores};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init();
    let params = get_params()?;

    let dataset = Dataset::from_path(&params.dataset_path)?;
    let store = Arc::new(
        MemoryStore::from_dataset(dataset)
            .with_context(|| format!("invalid dataset '{}'", params.dataset_path.display()))?,
    );

    let opts = Opts {
        dry_run: params.dry_run,
        ..Opts::default()
    };
    let aligner = Aligner::new(Stores::shared(store.clone()), opts);
    let result = aligner
        .align_sentence_to_block(params.block_id, params.anchor_id, params.speech_id)
        .await;

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    match params.output_type {
        OutputType::Json => {
            serde_json::to_writer_pretty(&mut writer, &result)?;
            writeln!(writer)?;
        }
        OutputType::Text => write_text(&mut writer, &result)?,
    }
    writer.flush()?;

    if let Some(path) = &params.dump_dataset {
        let file = File::create(path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &store.snapshot())?;
        out.flush()?;
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn write_text<W: Write>(w: &mut W, result: &AlignmentResult) -> io::Result<()> {
    writeln!(w, "block   {}", result.block_id)?;
    writeln!(w, "speech  {}", result.speech_id)?;
    if !result.success {
        let message = result.message.as_deref().unwrap_or("unknown error");
        return writeln!(w, "failed: {message}");
    }
    if let Some(status) = result.conversion_status {
        writeln!(w, "status  {status:?}")?;
    }

    writeln!(w)?;
    writeln!(w, "  #  score  begin..end (ms)     text")?;
    for s in &result.aligned_sentences {
        writeln!(
            w,
            "{:>3}  {:.3}  {:>8}..{:<8}  {}",
            s.order_index, s.score, s.begin_time, s.end_time, s.aligned_text
        )?;
    }

    writeln!(w)?;
    match &result.remaining_text {
        Some(rest) => writeln!(w, "remaining ({} chars): {rest}", rest.chars().count()),
        None => writeln!(w, "remaining: none"),
    }
}

/// Output format for the alignment result.
#[derive(Debug, Clone, ValueEnum)]
enum OutputType {
    /// Pretty-printed JSON.
    Json,

    /// A human-readable table.
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "blockalign")]
#[command(about = "Align transcript sentences onto a text block")]
struct Params {
    /// JSON dataset with `blocks`, `sentences`, `words` and `links`.
    #[arg(short = 'd', long = "dataset")]
    pub dataset_path: PathBuf,

    #[arg(short = 'b', long = "block")]
    pub block_id: Uuid,

    /// Sentence whose begin time starts the candidate run.
    #[arg(short = 'a', long = "anchor")]
    pub anchor_id: Uuid,

    #[arg(short = 's', long = "speech")]
    pub speech_id: Uuid,

    #[arg(long = "dry-run", default_value_t = false)]
    pub dry_run: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t = OutputType::Json
    )]
    pub output_type: OutputType,

    /// Write the dataset as it stands after the run to this file.
    #[arg(long = "dump-dataset")]
    pub dump_dataset: Option<PathBuf>,
}

fn get_params() -> Result<Params> {
    Ok(Params::parse())
}
