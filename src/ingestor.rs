// incident_ingestor/src/ingestor.rs
// Run-level orchestration: discover sources, normalize, plan and write.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::discovery::discover_sources;
use crate::error::{IngestorError, Result};
use crate::normalizer::read_rows;
use crate::plan::UpsertPlanner;
use crate::schema::SchemaConfig;
use crate::store::GraphStore;
use crate::writer::{GraphWriter, SourceSummary, WriterStats};

/// What to do with a row that has no `protocollo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKeyPolicy {
    /// Log the row and keep going.
    #[default]
    Skip,
    /// Abort the run.
    Reject,
}

/// Configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Dataset root (year directories) or a single export.
    pub source:             PathBuf,
    pub batch_size:         usize,
    pub schema:             SchemaConfig,
    /// Source encoding; the exports are latin-1.
    pub encoding:           &'static Encoding,
    /// Wipe the store before loading. Destructive.
    pub clear:              bool,
    pub ensure_constraints: bool,
    pub missing_key:        MissingKeyPolicy,
}

impl IngestorConfig {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source:             source.into(),
            batch_size:         crate::DEFAULT_BATCH_SIZE,
            schema:             SchemaConfig::default(),
            encoding:           encoding_rs::WINDOWS_1252,
            clear:              false,
            ensure_constraints: true,
            missing_key:        MissingKeyPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedRow {
    pub source: String,
    pub row:    usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceReport {
    pub rows_read:    usize,
    pub rows_skipped: usize,
    #[serde(flatten)]
    pub summary:      SourceSummary,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub sources:        Vec<SourceReport>,
    pub skipped:        Vec<SkippedRow>,
    pub writer:         WriterStats,
    pub next_person_id: u64,
    /// Why the run stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure:        Option<String>,
}

impl RunReport {
    pub fn rows_read(&self) -> usize {
        self.sources.iter().map(|s| s.rows_read).sum()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IngestorError::Other(format!("Failed to serialize ingestion report: {}", e)))?;
        std::fs::write(path, json)?;
        info!("Ingestion report saved to {}", path.display());
        Ok(())
    }
}

fn display_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Loads every export under `config.source` into `store`.
///
/// Sources are processed one at a time through a single writer. An unreadable
/// export or a failed batch ends the run; batches committed before that stay
/// in the store and a full re-run is safe.
pub async fn run<S: GraphStore>(store: &S, config: &IngestorConfig) -> Result<RunReport> {
    let (report, res) = run_with_report(store, config).await;
    res.map(|()| report)
}

/// Like [`run`], but always hands back the report.
///
/// When the run stops early the report covers everything committed up to that
/// point, including the partial source, and `failure` holds the error message.
pub async fn run_with_report<S: GraphStore>(store: &S, config: &IngestorConfig) -> (RunReport, Result<()>) {
    let mut report = RunReport::default();
    let res = load(store, config, &mut report).await;
    if let Err(e) = &res {
        report.failure = Some(e.to_string());
    }
    (report, res)
}

async fn load<S: GraphStore>(store: &S, config: &IngestorConfig, report: &mut RunReport) -> Result<()> {
    let sources = discover_sources(&config.source)?;
    if sources.is_empty() {
        warn!("No exports found under {}", config.source.display());
    }

    let planner = UpsertPlanner::new(&config.schema);
    let mut writer = GraphWriter::new(store, config.batch_size)?;

    if config.clear {
        writer.clear_store().await?;
    }
    if config.ensure_constraints {
        store.ensure_constraints(&config.schema.active_labels()).await?;
    }

    let res = load_sources(&mut writer, &planner, &sources, config, report).await;
    report.writer = writer.stats().clone();
    report.next_person_id = writer.next_person_id();
    res?;

    info!(
        "Run complete: {} sources, {} rows read, {} skipped, {} operations in {} batches",
        report.sources.len(),
        report.rows_read(),
        report.skipped.len(),
        report.writer.operations_applied,
        report.writer.batches_committed
    );
    Ok(())
}

async fn load_sources<S: GraphStore>(
    writer: &mut GraphWriter<'_, S>,
    planner: &UpsertPlanner<'_>,
    sources: &[PathBuf],
    config: &IngestorConfig,
    report: &mut RunReport,
) -> Result<()> {
    for path in sources {
        let name = display_name(path, &config.source);
        let rows = read_rows(path, config.encoding).map_err(|e| {
            error!("Cannot read {}: {}", name, e);
            e
        })?;
        info!("Loading {} ({} rows)", name, rows.len());

        writer.begin_source(&name).await?;
        let mut rows_skipped = 0;
        let mut outcome = Ok(());
        for (idx, row) in rows.iter().enumerate() {
            let row_no = idx + 1;
            match writer.write_row(planner, row, row_no).await {
                Ok(_) => {},
                Err(e @ IngestorError::MissingField { .. }) => {
                    if config.missing_key == MissingKeyPolicy::Reject {
                        let done = writer.summary();
                        error!(
                            "{}: {}; {} rows committed (last row {}), {} queued operations dropped",
                            name,
                            e,
                            done.rows_committed,
                            done.last_row,
                            writer.pending_len()
                        );
                        outcome = Err(e);
                        break;
                    }
                    warn!("Skipping {} row {}: {}", name, row_no, e);
                    rows_skipped += 1;
                    report.skipped.push(SkippedRow { source: name.clone(), row: row_no, reason: e.to_string() });
                },
                Err(e) => {
                    outcome = Err(e);
                    break;
                },
            }
        }

        let summary = match outcome {
            Ok(()) => writer.finish_source().await,
            Err(e) => Err(e),
        };
        match summary {
            Ok(summary) => report.sources.push(SourceReport { rows_read: rows.len(), rows_skipped, summary }),
            Err(e) => {
                report.sources.push(SourceReport { rows_read: rows.len(), rows_skipped, summary: writer.summary() });
                return Err(e);
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::memory::MemoryGraph;
    use crate::schema::Label;

    #[tokio::test]
    async fn skips_rows_without_protocollo() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("csv_incidentiGennaio.csv");
        fs::write(&file, "Protocollo;TipoPersona\n1;Conducente\n;Conducente\n2;Pedone\n").unwrap();

        let store = MemoryGraph::new();
        let report = run(&store, &IngestorConfig::new(&file)).await.unwrap();
        assert_eq!(report.rows_read(), 3);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].row, 2);
        assert_eq!(store.node_count(Label::Incident), 2);
        assert_eq!(report.next_person_id, 2);
    }

    #[tokio::test]
    async fn strict_mode_rejects_missing_protocollo() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("csv_incidentiGennaio.csv");
        fs::write(&file, "protocollo;tipopersona\n;Conducente\n").unwrap();

        let mut config = IngestorConfig::new(&file);
        config.missing_key = MissingKeyPolicy::Reject;
        let err = run(&MemoryGraph::new(), &config).await.unwrap_err();
        assert!(matches!(err, IngestorError::MissingField { row: 1, .. }));
    }

    #[tokio::test]
    async fn failed_run_still_reports_committed_work() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("csv_incidentiGennaio.csv");
        fs::write(&file, "protocollo;tipopersona\n1;Pedone\n2;Pedone\n3;Pedone\n").unwrap();

        // Three operations per pedestrian row: the second batch is row 2.
        let store = MemoryGraph::failing_on_batch(2);
        let mut config = IngestorConfig::new(&file);
        config.batch_size = 3;
        let (report, res) = run_with_report(&store, &config).await;

        assert!(matches!(res, Err(IngestorError::BatchFailed { rows_committed: 1, .. })));
        assert_eq!(store.batch_sizes(), vec![3]);
        assert_eq!(report.writer.batches_committed, 1);
        assert_eq!(report.writer.operations_applied, 3);
        assert_eq!(report.next_person_id, 1);
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].rows_read, 3);
        assert_eq!(report.sources[0].summary.rows_committed, 1);
        assert_eq!(report.sources[0].summary.last_row, 1);
        assert!(report.failure.as_deref().unwrap().contains("1 rows committed"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["writer"]["batches_committed"], 1);
        assert_eq!(json["sources"][0]["last_row"], 1);
    }

    #[tokio::test]
    async fn rejected_row_reports_progress_of_its_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("csv_incidentiGennaio.csv");
        fs::write(&file, "protocollo;tipopersona\n1;Pedone\n2;Pedone\n;Conducente\n").unwrap();

        let store = MemoryGraph::new();
        let mut config = IngestorConfig::new(&file);
        config.batch_size = 4;
        config.missing_key = MissingKeyPolicy::Reject;
        let (report, res) = run_with_report(&store, &config).await;

        assert!(matches!(res, Err(IngestorError::MissingField { row: 3, .. })));
        // Row 2 straddled the committed batch; its remaining operations were dropped.
        assert_eq!(store.batch_sizes(), vec![4]);
        assert_eq!(report.sources[0].summary.rows_committed, 1);
        assert_eq!(report.sources[0].summary.last_row, 1);
        assert_eq!(report.writer.batches_committed, 1);
        assert!(report.failure.is_some());
    }

    #[tokio::test]
    async fn successful_run_has_no_failure() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("csv_incidentiGennaio.csv");
        fs::write(&file, "protocollo\n1\n").unwrap();

        let (report, res) = run_with_report(&MemoryGraph::new(), &IngestorConfig::new(&file)).await;
        assert!(res.is_ok());
        assert!(report.failure.is_none());
        assert!(!serde_json::to_string(&report).unwrap().contains("failure"));
    }

    #[tokio::test]
    async fn constraints_follow_the_active_schema() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("csv_incidentiGennaio.csv");
        fs::write(&file, "protocollo\n1\n").unwrap();

        let store = MemoryGraph::new();
        run(&store, &IngestorConfig::new(&file)).await.unwrap();
        assert_eq!(store.constrained_labels(), SchemaConfig::default().active_labels());
    }
}
