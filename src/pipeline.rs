//! Orchestration of one run.
//!
//! ```text
//! validate ─▶ discover ─▶ load store ─▶ classify ─▶ summarize (pool) ─▶ merge ─▶ write
//! ```
//!
//! Configuration errors surface before the tree is touched. Summarization
//! runs on a bounded pool of tokio tasks, one task per file, and the merge
//! only starts once every task has resolved. Dropping the run future (for
//! example on Ctrl-C) aborts the pool before anything is written, so the
//! prior document stays as it was.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::classify::{classify, Classification};
use crate::config::Config;
use crate::error::{CodectxError, Result};
use crate::ignore::IgnoreRuleSet;
use crate::merge::{merge, unchanged_from, write_document};
use crate::models::{DiscoveredFile, RecordKind, Staleness, SummaryRecord};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::remote::SummaryClient;
use crate::store::SummaryStore;
use crate::summarize::{Outcome, Summarizer};
use crate::walker::{discover, resolve_root, Discovery};

/// Which files a run sends through the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    /// Only `new` and `changed` files.
    Update,
    /// Every discovered file.
    ScanAll,
}

impl RunAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunAction::Update => "update",
            RunAction::ScanAll => "scan",
        }
    }
}

/// Discovery, prior store and classification for one root. Read-only.
#[derive(Debug)]
pub struct Survey {
    pub discovery: Discovery,
    pub store: SummaryStore,
    pub classification: Classification,
}

/// Tally of one run, printed by the CLI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub action: Option<RunAction>,
    pub root: PathBuf,
    pub output: PathBuf,
    pub discovered: usize,
    pub ignored: usize,
    pub pattern_count: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub processed: usize,
    pub raw: usize,
    pub generated: usize,
    pub mock: usize,
    pub skipped: usize,
    pub undecodable: usize,
    pub failed: usize,
    pub records: usize,
    pub removed: usize,
    /// False when the merged records matched the existing document.
    pub written: bool,
}

impl RunReport {
    fn count(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Produced(record) => match record.kind {
                Some(RecordKind::Raw) => self.raw += 1,
                Some(RecordKind::Generated) => self.generated += 1,
                Some(RecordKind::Mock) => self.mock += 1,
                Some(RecordKind::Skipped) => self.skipped += 1,
                None => {}
            },
            Outcome::Undecodable => self.undecodable += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = self.action.map_or("run", |a| a.as_str());
        writeln!(f, "{} {}", action, self.root.display())?;
        writeln!(
            f,
            "  discovered: {} files ({} ignored, {} patterns)",
            self.discovered, self.ignored, self.pattern_count
        )?;
        writeln!(
            f,
            "  new: {}  changed: {}  up-to-date: {}",
            self.new, self.changed, self.unchanged
        )?;
        writeln!(
            f,
            "  processed: {} (raw {}, generated {}, mock {}, skipped {})",
            self.processed, self.raw, self.generated, self.mock, self.skipped
        )?;
        if self.undecodable > 0 {
            writeln!(f, "  binary or undecodable: {}", self.undecodable)?;
        }
        if self.failed > 0 {
            writeln!(f, "  failed (left stale): {}", self.failed)?;
        }
        if self.removed > 0 {
            writeln!(f, "  removed: {}", self.removed)?;
        }
        if self.written {
            writeln!(f, "  wrote: {} ({} files)", self.output.display(), self.records)?;
        } else {
            writeln!(f, "  unchanged: {}", self.output.display())?;
        }
        write!(f, "ok")
    }
}

/// Discover, load the prior document and classify. Never writes.
pub fn survey(config: &Config, reporter: &dyn ProgressReporter) -> Result<Survey> {
    let root = resolve_root(&config.root)?;
    reporter.report(ProgressEvent::Discovering {
        root: root.display().to_string(),
    });

    let rules = IgnoreRuleSet::load(&root, config.output_name());
    let discovery = discover(&root, &rules)?;
    info!(
        "discovered {} files, {} ignored",
        discovery.files.len(),
        discovery.ignored.len()
    );

    let store = SummaryStore::load_file(&config.output_path());
    let classification = classify(&discovery.files, &store);
    reporter.report(ProgressEvent::Classified {
        new: classification.count(Staleness::New),
        changed: classification.count(Staleness::Changed),
        unchanged: classification.count(Staleness::Unchanged),
    });

    Ok(Survey {
        discovery,
        store,
        classification,
    })
}

/// Run `action` with the backend selected by `config.mode`.
pub async fn run(
    config: &Config,
    action: RunAction,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunReport> {
    config.validate()?;
    config.validate_remote()?;
    let summarizer = Summarizer::from_config(config)?;
    execute(config, action, Arc::new(summarizer), reporter).await
}

/// Run `action` with a caller-supplied summarization backend.
pub async fn run_with_client(
    config: &Config,
    action: RunAction,
    client: Arc<dyn SummaryClient>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunReport> {
    config.validate()?;
    let summarizer = Summarizer::with_client(config, client);
    execute(config, action, Arc::new(summarizer), reporter).await
}

async fn execute(
    config: &Config,
    action: RunAction,
    summarizer: Arc<Summarizer>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunReport> {
    let Survey {
        discovery,
        store,
        classification,
    } = survey(config, reporter.as_ref())?;

    let mut report = RunReport {
        action: Some(action),
        root: discovery.root.clone(),
        output: config.output_path(),
        discovered: discovery.files.len(),
        ignored: discovery.ignored.len(),
        pattern_count: discovery.pattern_count,
        new: classification.count(Staleness::New),
        changed: classification.count(Staleness::Changed),
        unchanged: classification.count(Staleness::Unchanged),
        ..RunReport::default()
    };

    let targets: Vec<DiscoveredFile> = discovery
        .files
        .iter()
        .filter(|f| action == RunAction::ScanAll || classification.is_stale(&f.relative_path))
        .cloned()
        .collect();
    report.processed = targets.len();

    let fresh = process_all(
        targets,
        summarizer,
        config.concurrency,
        reporter.clone(),
        &mut report,
    )
    .await;

    let (merged, stats) = merge(&fresh, &store, discovery.relative_paths());
    report.records = merged.len();
    report.removed = stats.dropped;
    debug!(
        "merge: {} fresh, {} carried, {} dropped",
        stats.fresh, stats.carried, stats.dropped
    );

    let output = config.output_path();
    if unchanged_from(&merged, &store) && output.exists() {
        info!("{} is up to date, not rewriting", output.display());
        return Ok(report);
    }

    write_document(&output, &merged)?;
    report.written = true;
    reporter.report(ProgressEvent::Written {
        path: output.display().to_string(),
        records: merged.len(),
    });
    Ok(report)
}

/// Summarize `targets` on at most `concurrency` tasks at once.
///
/// Returns only after every task has resolved.
async fn process_all(
    targets: Vec<DiscoveredFile>,
    summarizer: Arc<Summarizer>,
    concurrency: usize,
    reporter: Arc<dyn ProgressReporter>,
    report: &mut RunReport,
) -> BTreeMap<String, SummaryRecord> {
    let total = targets.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let started = Arc::new(AtomicUsize::new(0));
    let mut set = JoinSet::new();

    for file in targets {
        let summarizer = summarizer.clone();
        let semaphore = semaphore.clone();
        let started = started.clone();
        let reporter = reporter.clone();
        set.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return (file.relative_path, Outcome::Failed(CodectxError::Interrupted));
            };
            let n = started.fetch_add(1, Ordering::SeqCst) + 1;
            reporter.report(ProgressEvent::Processing {
                n,
                total,
                path: file.relative_path.clone(),
            });
            let outcome = summarizer.produce(&file).await;
            (file.relative_path, outcome)
        });
    }

    let mut fresh = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let (path, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!("summarization task failed: {}", e);
                report.failed += 1;
                continue;
            }
        };

        report.count(&outcome);
        reporter.report(ProgressEvent::Outcome {
            path: path.clone(),
            outcome: outcome.label().to_string(),
        });

        match outcome {
            Outcome::Produced(record) => {
                fresh.insert(path, record);
            }
            Outcome::Undecodable => warn!("{}", CodectxError::Decode(path)),
            Outcome::Failed(e) => warn!("no record for {}: {}", path, e),
        }
    }
    fresh
}
