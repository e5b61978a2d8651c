//! Ingestion orchestrator.
//!
//! For each candidate file: derive its properties, look up its block visit
//! in the science database and write the graph to the archive in the
//! requested mode. Files are independent; a bounded number of them are in
//! flight at once.

use anyhow::{Context, Result};
use archive_common::{parse_date, ArchiveError, DateRange, Instrument};
use chrono::NaiveDate;
use clap::ValueEnum;
use futures::stream::{self, StreamExt};
use ingestion::{Derivation, ExposureDeriver};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::{Archive, ScienceDatabase, UpdateScope, WriteMode, WriteOutcome};
use tracing::{debug, error, info, instrument, warn};

use crate::discovery;

/// What to do with each selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Task {
    Insert,
    Update,
    Delete,
}

/// Where the graphs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// The PostgreSQL archive.
    Production,
    /// An in-memory archive; nothing is persisted.
    Dummy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop starting new files after the first failure.
    #[default]
    Abort,
    /// Record the failure and carry on.
    Continue,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub task: Task,
    pub scope: UpdateScope,
    pub policy: ErrorPolicy,
    pub workers: usize,
    /// 0 to 3; from 2 on failures are logged with their full derivation trace.
    pub verbosity: u8,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            task: Task::Insert,
            scope: UpdateScope::All,
            policy: ErrorPolicy::Abort,
            workers: 1,
            verbosity: 1,
        }
    }
}

/// Files to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// All raw files of the listed instruments (all instruments when empty)
    /// in a range of nights.
    Nights {
        range: DateRange,
        instruments: Vec<Instrument>,
    },
    /// A single named file.
    File(PathBuf),
}

impl Selection {
    /// Build a selection from command-line values.
    ///
    /// Either a file or both dates must be given, never both.
    pub fn parse(
        file: Option<PathBuf>,
        start: Option<&str>,
        end: Option<&str>,
        instruments: &[String],
        today: NaiveDate,
        end_inclusive: bool,
    ) -> Result<Self> {
        let instruments = instruments
            .iter()
            .map(|name| Instrument::for_name(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        match (file, start, end) {
            (Some(file), None, None) => Ok(Selection::File(file)),
            (Some(_), _, _) => anyhow::bail!("A file cannot be combined with a date range"),
            (None, Some(start), Some(end)) => {
                let range = DateRange::new(
                    parse_date(start, today)?,
                    parse_date(end, today)?,
                    end_inclusive,
                )?;
                Ok(Selection::Nights { range, instruments })
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                anyhow::bail!("A date range needs both a start and an end date")
            }
            (None, None, None) => anyhow::bail!("Either a file or a date range is required"),
        }
    }
}

/// Result of processing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Written(WriteOutcome),
    /// The file is deliberately not archived.
    Ignored,
    /// Not attempted because the run was aborted.
    Skipped,
}

/// Counts of what happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub already_present: usize,
    pub updated: usize,
    pub removed: usize,
    pub absent: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl RunSummary {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Written(WriteOutcome::Created { .. }) => self.created += 1,
            FileOutcome::Written(WriteOutcome::AlreadyPresent) => self.already_present += 1,
            FileOutcome::Written(WriteOutcome::Updated { .. }) => self.updated += 1,
            FileOutcome::Written(WriteOutcome::Removed { .. }) => self.removed += 1,
            FileOutcome::Written(WriteOutcome::Absent) => self.absent += 1,
            FileOutcome::Ignored => self.ignored += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether every file was processed without error.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives derivation and archive writes for a selection of files.
pub struct Orchestrator {
    deriver: Arc<ExposureDeriver>,
    archive: Arc<dyn Archive>,
    science: Arc<dyn ScienceDatabase>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        deriver: ExposureDeriver,
        archive: Arc<dyn Archive>,
        science: Arc<dyn ScienceDatabase>,
        options: RunOptions,
    ) -> Self {
        Self {
            deriver: Arc::new(deriver),
            archive,
            science,
            options,
        }
    }

    /// Files the selection refers to, in processing order.
    pub fn candidates(&self, selection: &Selection, fits_base_dir: &Path) -> Result<Vec<PathBuf>> {
        match selection {
            Selection::File(path) => Ok(vec![path.clone()]),
            Selection::Nights { range, instruments } => {
                let instruments: Vec<Instrument> = if instruments.is_empty() {
                    self.deriver.registry().instruments().collect()
                } else {
                    instruments.clone()
                };
                discovery::discover(fits_base_dir, range, &instruments)
            }
        }
    }

    /// Process every selected file and report what happened.
    ///
    /// Per-file failures never escape; they are logged and listed in the
    /// summary.
    pub async fn run(&self, selection: &Selection, fits_base_dir: &Path) -> Result<RunSummary> {
        let files = self.candidates(selection, fits_base_dir)?;
        info!(
            files = files.len(),
            task = ?self.options.task,
            workers = self.options.workers,
            "Starting ingestion run"
        );

        let aborted = AtomicBool::new(false);
        let aborted = &aborted;
        let results: Vec<(PathBuf, Result<FileOutcome>)> = stream::iter(files)
            .map(|path| async move {
                if aborted.load(Ordering::SeqCst) {
                    return (path, Ok(FileOutcome::Skipped));
                }
                let outcome = self.process_file(&path).await;
                if outcome.is_err() && self.options.policy == ErrorPolicy::Abort {
                    aborted.store(true, Ordering::SeqCst);
                }
                (path, outcome)
            })
            .buffer_unordered(self.options.workers.max(1))
            .collect()
            .await;

        let mut summary = RunSummary::default();
        for (path, outcome) in results {
            match outcome {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    let message = if self.options.verbosity >= 2 {
                        format!("{:?}", e)
                    } else {
                        format!("{:#}", e)
                    };
                    let transient = e
                        .downcast_ref::<ArchiveError>()
                        .map(ArchiveError::is_transient)
                        .unwrap_or(false);
                    error!(
                        path = %path.display(),
                        error = %message,
                        transient,
                        "Failed to process file"
                    );
                    summary.failures.push((path, message));
                }
            }
        }
        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "Run aborted after a failure");
        }

        info!(
            created = summary.created,
            already_present = summary.already_present,
            updated = summary.updated,
            removed = summary.removed,
            absent = summary.absent,
            ignored = summary.ignored,
            skipped = summary.skipped,
            failed = summary.failed(),
            "Ingestion run finished"
        );
        Ok(summary)
    }

    /// Process a single file in the configured task.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path) -> Result<FileOutcome> {
        if self.options.task == Task::Delete {
            let artifact_path = self.deriver.artifact_path(path);
            let outcome = self.archive.remove(&artifact_path).await?;
            debug!(outcome = outcome.label(), "Removed file");
            return Ok(FileOutcome::Written(outcome));
        }

        // Header parsing and filter curve reads are blocking I/O.
        let deriver = Arc::clone(&self.deriver);
        let owned = path.to_path_buf();
        let derivation = tokio::task::spawn_blocking(move || deriver.derive(&owned))
            .await
            .context("Derivation task failed")??;

        let exposure = match derivation {
            Derivation::Derived(exposure) => *exposure,
            Derivation::Ignored { reason } => {
                info!(reason = %reason, "Ignoring file");
                return Ok(FileOutcome::Ignored);
            }
        };

        let block_visit = match exposure.block_visit_id {
            Some(id) => self
                .science
                .block_visit(id)
                .await
                .with_context(|| format!("Failed to look up block visit {}", id))?,
            None => None,
        };
        if exposure.block_visit_id.is_some() && block_visit.is_none() {
            warn!(
                block_visit_id = ?exposure.block_visit_id,
                "Block visit unknown to the science database"
            );
        }

        let graph = exposure.into_graph(block_visit.as_ref())?;
        let mode = match self.options.task {
            Task::Update => WriteMode::Update(self.options.scope),
            _ => WriteMode::Create,
        };
        let outcome = self.archive.write(&graph, mode).await?;
        debug!(outcome = outcome.label(), "Wrote observation");
        Ok(FileOutcome::Written(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_selection_from_dates() {
        let today = date(2021, 6, 16);
        let selection = Selection::parse(
            None,
            Some("yesterday"),
            Some("today"),
            &["rss".to_string(), "SALTICAM".to_string()],
            today,
            false,
        )
        .unwrap();
        match selection {
            Selection::Nights { range, instruments } => {
                assert_eq!(range.start(), date(2021, 6, 15));
                assert_eq!(range.end(), today);
                assert_eq!(instruments, vec![Instrument::Rss, Instrument::Salticam]);
            }
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_selection_rejects_inverted_range() {
        let err = Selection::parse(None, Some("2021-06-16"), Some("2021-06-15"), &[], date(2021, 7, 1), true)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid date range"));
    }

    #[test]
    fn test_selection_rejects_empty_exclusive_range() {
        assert!(
            Selection::parse(None, Some("2021-06-15"), Some("2021-06-15"), &[], date(2021, 7, 1), false)
                .is_err()
        );
    }

    #[test]
    fn test_selection_needs_file_or_range() {
        let today = date(2021, 7, 1);
        assert!(Selection::parse(None, None, None, &[], today, false).is_err());
        assert!(Selection::parse(None, Some("today"), None, &[], today, false).is_err());
        assert!(Selection::parse(
            Some(PathBuf::from("a.fits")),
            Some("today"),
            Some("today"),
            &[],
            today,
            true
        )
        .is_err());
        assert_eq!(
            Selection::parse(Some(PathBuf::from("a.fits")), None, None, &[], today, false).unwrap(),
            Selection::File(PathBuf::from("a.fits"))
        );
    }

    #[test]
    fn test_selection_rejects_unknown_instrument() {
        let err = Selection::parse(None, Some("today"), Some("today"), &["SHOC".to_string()], date(2021, 7, 1), true)
            .unwrap_err();
        assert!(err.to_string().contains("SHOC"));
    }
}
