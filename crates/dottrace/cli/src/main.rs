// Dottrace
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Dottrace CLI Tool
//!
//! Command-line interface for running the statistics analysis over a JSON
//! trace and printing the resulting tree or derived segments.

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use dottrace_common::TimeRange;
use dottrace_core::analysis::SupplementaryFiles;
use dottrace_core::event::{EventSource, RecordedTrace, TraceEvent};
use dottrace_core::provider::{ResponseStatus, StatisticsProvider, StatisticsQuery, TreeResponse};
use dottrace_core::segment_store::{Segment, SegmentListener};
use dottrace_core::TraceAnalysis;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dottrace")]
#[command(about = "Dottrace - Trace Statistics CLI")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the statistics analysis and print the event-type tree
    Analyze {
        /// Path to a JSON trace file (array of {timestamp, name, fields})
        trace: PathBuf,
        /// Directory holding supplementary artifact files
        #[arg(long, short = 's')]
        supplementary_dir: Option<PathBuf>,
        /// Range start, defaults to the trace start
        #[arg(long)]
        begin: Option<i64>,
        /// Range end, defaults to the trace end
        #[arg(long)]
        end: Option<i64>,
        /// Fetch in two steps: coarse total first, then the breakdown
        #[arg(long)]
        two_phase: bool,
    },
    /// Derive segments and print them as they are committed
    Segments {
        /// Path to a JSON trace file
        trace: PathBuf,
        /// Directory holding supplementary artifact files
        #[arg(long, short = 's')]
        supplementary_dir: Option<PathBuf>,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            trace,
            supplementary_dir,
            begin,
            end,
            two_phase,
        } => handle_analyze(&trace, supplementary_dir, begin, end, two_phase),
        Commands::Segments { trace, supplementary_dir } => handle_segments(&trace, supplementary_dir),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

/// Get the supplementary directory with XDG compliance
fn get_supplementary_directory(custom_dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = custom_dir {
        return dir;
    }

    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data_home).join("dottrace")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local").join("share").join("dottrace")
    } else {
        PathBuf::from(".dottrace")
    }
}

fn load_trace(path: &Path) -> anyhow::Result<Arc<RecordedTrace>> {
    let file = std::fs::File::open(path).with_context(|| format!("cannot open trace {}", path.display()))?;
    let events: Vec<TraceEvent> = serde_json::from_reader(file).context("trace is not a JSON event array")?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("trace")
        .to_string();
    info!("Loaded {} events from {}", events.len(), path.display());
    Ok(Arc::new(RecordedTrace::new(name, events)))
}

fn build_analysis(trace: Arc<RecordedTrace>, supplementary_dir: Option<PathBuf>) -> Arc<TraceAnalysis> {
    let analysis = Arc::new(TraceAnalysis::new("statistics"));
    analysis.set_name(trace.name());
    analysis.set_supplementary(SupplementaryFiles::new(get_supplementary_directory(supplementary_dir)));
    analysis.set_trace(trace);
    analysis
}

fn handle_analyze(
    trace_path: &Path,
    supplementary_dir: Option<PathBuf>,
    begin: Option<i64>,
    end: Option<i64>,
    two_phase: bool,
) -> anyhow::Result<()> {
    let trace = load_trace(trace_path)?;
    let full = trace.time_range().unwrap_or(TimeRange::new(0, 0));
    let range = TimeRange::new(begin.unwrap_or(full.start), end.unwrap_or(full.end));

    let analysis = build_analysis(trace, supplementary_dir);
    let provider = StatisticsProvider::create(Arc::clone(&analysis))
        .ok_or_else(|| anyhow!("the analysis could not be scheduled"))?;

    let response = if two_phase {
        analysis.wait_for_completion(None);
        let coarse = provider.fetch_tree(&StatisticsQuery::new(range).with_step(0), None);
        let total = coarse_total(&coarse)?;
        println!("total events in range: {total}");
        provider.fetch_tree(&StatisticsQuery::new(range).with_step(1).with_total(total), None)
    } else {
        provider.fetch_tree(&StatisticsQuery::new(range), None)
    };

    match response.status {
        ResponseStatus::Completed | ResponseStatus::Running => {
            let model = response.model.expect("a non-failed response carries a model");
            print_tree_columns(&model.column_labels, |widths| {
                for row in &model.rows {
                    let indent = if row.parent_id < 0 { "" } else { "  " };
                    println!(
                        "{indent}{:<width0$}  {:>width1$}  {:>width2$}",
                        row.values[0],
                        row.values[1],
                        row.values[2],
                        width0 = widths[0],
                        width1 = widths[1],
                        width2 = widths[2],
                    );
                }
            });
            analysis.dispose();
            Ok(())
        }
        ResponseStatus::Cancelled => {
            analysis.dispose();
            Err(anyhow!("the query was cancelled"))
        }
        ResponseStatus::Failed => {
            analysis.dispose();
            Err(anyhow!("query failed: {}", response.message))
        }
    }
}

fn coarse_total(coarse: &TreeResponse) -> anyhow::Result<i64> {
    coarse
        .model
        .as_ref()
        .and_then(|model| model.rows.first())
        .and_then(|row| row.values.get(1))
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| anyhow!("coarse step returned no usable total"))
}

fn print_tree_columns(labels: &[String], body: impl FnOnce(&[usize; 3])) {
    let widths = [labels[0].len().max(24), labels[1].len().max(12), labels[2].len().max(10)];
    println!(
        "{:<width0$}  {:>width1$}  {:>width2$}",
        labels[0],
        labels[1],
        labels[2],
        width0 = widths[0],
        width1 = widths[1],
        width2 = widths[2],
    );
    body(&widths);
}

struct PrintListener;

impl SegmentListener for PrintListener {
    fn on_new_segments(&self, batch: &[Arc<Segment>]) {
        for segment in batch {
            println!(
                "[{:>8} - {:>8}] {:<24} {}",
                segment.start,
                segment.end,
                segment.name,
                segment.content_string()
            );
        }
    }
}

fn handle_segments(trace_path: &Path, supplementary_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let trace = load_trace(trace_path)?;
    let analysis = build_analysis(trace, supplementary_dir);

    analysis.add_listener(Arc::new(PrintListener));
    analysis
        .schedule()
        .map_err(|error| anyhow!("the analysis could not be scheduled: {error}"))?;

    let completed = analysis.wait_for_completion(None);
    let count = analysis.segment_store().map(|store| store.len()).unwrap_or(0);
    analysis.dispose();

    if !completed {
        return Err(anyhow!("segment derivation did not complete"));
    }
    println!("{count} segments derived");
    Ok(())
}
