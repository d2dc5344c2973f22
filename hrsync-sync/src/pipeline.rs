//! Orchestrator shared by the CLI and the server.
//!
//! A run resolves its institution selection, lists every employee up front
//! (so progress has a stable `total`), then walks institutions and employees
//! strictly one at a time:
//!
//! 1. Idempotency guard (zero HRIMS calls on skip).
//! 2. Fetch with bounded retry.
//! 3. Normalize, upload, write the reference back.
//! 4. Record the result and emit a progress event.
//! 5. Checkpoint every `batch_size` employees and after each institution.
//!
//! Only setup errors surface as `Err`. Per-employee and per-institution
//! failures end up in the [`RunReport`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use hrsync_core::{
    ArtifactKind, Config, Directory, Employee, Institution, PipelineConfig, YamlDirectory,
};
use hrsync_hrims::{extract_institution_photos, HrimsApi, HrimsClient, PayrollPhoto};

use crate::checkpoint::{self, Checkpoint};
use crate::enumerate::{select_institutions, Scope, Selection};
use crate::error::SyncError;
use crate::guard;
use crate::object_store::{FsObjectStore, ObjectStore};
use crate::processor::Processor;
use crate::progress::{ProgressReporter, ProgressSink, Summary, SyncResult};
use crate::report::{InstitutionReport, RunReport};
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Settings and options
// ---------------------------------------------------------------------------

/// Pacing, retry and batching knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub employee_delay: Duration,
    pub institution_delay: Duration,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            employee_delay: config.employee_delay(),
            institution_delay: config.institution_delay(),
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Cooperative cancellation, checked after each employee.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a single run should do.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub artifact: ArtifactKind,
    pub selection: Selection,
    /// Continue from the stored checkpoint for `artifact`.
    pub resume: bool,
    /// Photos only: one institution-level HRIMS call instead of one per employee.
    pub bulk: bool,
    pub cancel: CancelFlag,
}

impl RunOptions {
    pub fn new(artifact: ArtifactKind, selection: Selection) -> Self {
        Self {
            artifact,
            selection,
            resume: false,
            bulk: false,
            cancel: CancelFlag::default(),
        }
    }
}

struct Planned {
    institution: Institution,
    employees: Result<Vec<Employee>, String>,
}

impl Planned {
    fn len(&self) -> usize {
        self.employees.as_ref().map(Vec::len).unwrap_or(0)
    }
}

type BulkPhotos = (Result<HashMap<String, PayrollPhoto>, String>, u32);

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    directory: Arc<dyn Directory>,
    hrims: Arc<dyn HrimsApi>,
    store: Arc<dyn ObjectStore>,
    data_dir: PathBuf,
    settings: Settings,
}

impl Pipeline {
    pub fn new(
        directory: Arc<dyn Directory>,
        hrims: Arc<dyn HrimsApi>,
        store: Arc<dyn ObjectStore>,
        data_dir: impl Into<PathBuf>,
        settings: Settings,
    ) -> Self {
        Self {
            directory,
            hrims,
            store,
            data_dir: data_dir.into(),
            settings,
        }
    }

    /// Production wiring: YAML directory, `ureq` HRIMS client, filesystem
    /// object store.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(YamlDirectory::new(&config.data_dir)),
            Arc::new(HrimsClient::new(config.hrims.clone())),
            Arc::new(FsObjectStore::new(
                config.storage_root(),
                config.reference_prefix(),
            )),
            &config.data_dir,
            Settings::from_config(&config.pipeline),
        )
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Every setup check [`Pipeline::run`] performs, without touching HRIMS,
    /// the object store or the checkpoint. Returns the employee total.
    ///
    /// Transports that commit to a response before the run starts (a
    /// streamed HTTP body) call this first so setup errors keep their own
    /// status instead of arriving mid-stream.
    pub fn preflight(&self, options: &RunOptions) -> Result<usize, SyncError> {
        let plan = self.plan(&options.selection)?;
        self.resume_checkpoint(options, &options.selection.to_string())?;
        Ok(plan.iter().map(Planned::len).sum())
    }

    /// Run the pipeline, streaming progress into `sink`.
    pub fn run(
        &self,
        options: &RunOptions,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunReport, SyncError> {
        let artifact = options.artifact;
        let scope = options.selection.to_string();
        let plan = self.plan(&options.selection)?;
        let total: usize = plan.iter().map(Planned::len).sum();

        let resumed = self.resume_checkpoint(options, &scope)?;
        let mut checkpoint =
            resumed.unwrap_or_else(|| Checkpoint::start(artifact, scope.clone()));
        let offset: usize = plan
            .iter()
            .map(|p| {
                if checkpoint.is_completed(&p.institution.id) {
                    p.len()
                } else {
                    checkpoint.offset_for(&p.institution.id).min(p.len())
                }
            })
            .sum();
        self.save_checkpoint(&mut checkpoint);

        tracing::info!(
            "{artifact} sync: {} institution(s), {total} employee(s), {scope}{}",
            plan.len(),
            if offset > 0 {
                format!(", resuming after {offset}")
            } else {
                String::new()
            }
        );

        let processor = Processor {
            directory: self.directory.as_ref(),
            hrims: self.hrims.as_ref(),
            store: self.store.as_ref(),
            retry: self.settings.retry,
        };
        let mut reporter = ProgressReporter::resume(sink, total, offset, checkpoint.summary);
        let mut reports = Vec::with_capacity(plan.len());
        let mut cancelled = false;
        let mut first = true;

        'institutions: for planned in &plan {
            let institution = &planned.institution;
            if checkpoint.is_completed(&institution.id) {
                tracing::debug!("{}: already completed, skipping", institution.name);
                continue;
            }
            if options.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if !first {
                pause(self.settings.institution_delay);
            }
            first = false;

            let employees = match &planned.employees {
                Ok(employees) => employees,
                Err(message) => {
                    tracing::error!("{}: {message}", institution.name);
                    reports.push(InstitutionReport {
                        id: institution.id.clone(),
                        name: institution.name.clone(),
                        summary: Summary::default(),
                        error: Some(message.clone()),
                    });
                    continue;
                }
            };

            let start = checkpoint.offset_for(&institution.id).min(employees.len());
            let mut institution_summary = if start > 0 {
                checkpoint.institution_summary
            } else {
                Summary::default()
            };
            checkpoint.institution_id = Some(institution.id.clone());
            checkpoint.last_offset = start;
            checkpoint.institution_summary = institution_summary;
            tracing::info!(
                "{} ({}): {} employee(s), starting at {start}",
                institution.name,
                institution.id,
                employees.len()
            );

            let bulk = (options.bulk && artifact == ArtifactKind::Photos)
                .then(|| self.fetch_bulk(institution, &employees[start..]));

            for (index, employee) in employees.iter().enumerate().skip(start) {
                let outcome = match &bulk {
                    Some((photos, attempts)) => {
                        processor.process_bulk_photo(employee, photos, *attempts)
                    }
                    None => processor.process(employee, artifact),
                };
                institution_summary.record(outcome.status);
                let called_hrims = bulk.is_none() && outcome.called_hrims();
                let connected = reporter.record(SyncResult {
                    identifier: employee.id.0.clone(),
                    subject_name: employee.name.clone(),
                    institution: institution.name.clone(),
                    status: outcome.status,
                    message: outcome.message,
                    attempts: outcome.attempts,
                });
                if !connected {
                    options.cancel.cancel();
                }

                let resolved = index + 1;
                let stop = options.cancel.is_cancelled();
                if stop || resolved % self.settings.batch_size == 0 || resolved == employees.len() {
                    checkpoint.last_offset = resolved;
                    checkpoint.institution_summary = institution_summary;
                    checkpoint.summary = *reporter.summary();
                    checkpoint.total_processed = reporter.summary().total;
                    self.save_checkpoint(&mut checkpoint);
                }
                if stop {
                    tracing::warn!(
                        "{}: cancelled after {resolved}/{} employee(s)",
                        institution.name,
                        employees.len()
                    );
                    cancelled = true;
                    reports.push(InstitutionReport {
                        id: institution.id.clone(),
                        name: institution.name.clone(),
                        summary: institution_summary,
                        error: Some("cancelled".to_string()),
                    });
                    break 'institutions;
                }
                if called_hrims {
                    pause(self.settings.employee_delay);
                }
            }

            checkpoint.completed_institutions.push(institution.id.clone());
            checkpoint.last_offset = employees.len();
            checkpoint.institution_summary = institution_summary;
            checkpoint.summary = *reporter.summary();
            checkpoint.total_processed = reporter.summary().total;
            self.save_checkpoint(&mut checkpoint);
            tracing::info!(
                "{}: {} ok, {} partial, {} failed, {} skipped",
                institution.name,
                institution_summary.successful,
                institution_summary.partial,
                institution_summary.failed,
                institution_summary.skipped
            );
            reports.push(InstitutionReport {
                id: institution.id.clone(),
                name: institution.name.clone(),
                summary: institution_summary,
                error: None,
            });
        }

        if !cancelled {
            checkpoint.finished = true;
            self.save_checkpoint(&mut checkpoint);
        }
        let (results, summary) = reporter.complete(cancelled);
        Ok(RunReport {
            artifact,
            summary,
            results,
            institutions: reports,
            resumed_from: offset,
            cancelled,
        })
    }

    /// Resolve institutions and list their employees.
    ///
    /// Explicitly named institutions must exist and have employees; in
    /// broader selections an unreadable institution is recorded and skipped.
    fn plan(&self, selection: &Selection) -> Result<Vec<Planned>, SyncError> {
        let explicit = matches!(selection.scope, Scope::Ids(_));
        let institutions = select_institutions(self.directory.as_ref(), selection)?;
        let mut plan = Vec::with_capacity(institutions.len());
        for institution in institutions {
            let employees = match self.directory.list_employees(&institution.id) {
                Ok(employees) if explicit && employees.is_empty() => {
                    return Err(SyncError::NoEmployees { id: institution.id })
                }
                Ok(employees) => Ok(employees),
                Err(e) if explicit => return Err(e.into()),
                Err(e) => Err(e.to_string()),
            };
            plan.push(Planned {
                institution,
                employees,
            });
        }
        Ok(plan)
    }

    fn resume_checkpoint(
        &self,
        options: &RunOptions,
        scope: &str,
    ) -> Result<Option<Checkpoint>, SyncError> {
        if !options.resume {
            return Ok(None);
        }
        match checkpoint::load_at(&self.data_dir, options.artifact)? {
            None => {
                tracing::info!("no {} checkpoint; starting from the beginning", options.artifact);
                Ok(None)
            }
            Some(cp) if cp.finished => {
                tracing::info!("last {} run finished; starting from the beginning", options.artifact);
                Ok(None)
            }
            Some(cp) if cp.scope != scope => Err(SyncError::CheckpointScope {
                expected: scope.to_string(),
                found: cp.scope,
            }),
            Some(cp) => Ok(Some(cp)),
        }
    }

    /// A failed checkpoint write is logged, not fatal: the run itself is
    /// still correct, only resumability is degraded.
    fn save_checkpoint(&self, checkpoint: &mut Checkpoint) {
        checkpoint.timestamp = Utc::now();
        if let Err(e) = checkpoint::save_at(&self.data_dir, checkpoint) {
            tracing::error!("failed to persist {} checkpoint: {e}", checkpoint.artifact);
        }
    }

    /// One institution-level photo call, skipped entirely when every
    /// employee is already covered by the guard.
    fn fetch_bulk(&self, institution: &Institution, employees: &[Employee]) -> BulkPhotos {
        let prefix = self.store.reference_prefix();
        let needed = employees
            .iter()
            .any(|e| guard::check_bulk_photo(e, prefix).is_ok());
        if !needed {
            return (Ok(HashMap::new()), 0);
        }
        let Some(key) = institution.search_key() else {
            return (
                Err("Institution has no vote number or tax id".to_string()),
                0,
            );
        };

        let (fetched, attempts) = self
            .settings
            .retry
            .run(|| self.hrims.fetch_institution_photos(&key));
        let photos = fetched
            .map_err(|e| e.to_string())
            .and_then(|raw| extract_institution_photos(&raw).map_err(|e| e.to_string()))
            .map(|photos| {
                photos
                    .into_iter()
                    .map(|p| (p.payroll_number.clone(), p))
                    .collect::<HashMap<_, _>>()
            });
        match &photos {
            Ok(map) => tracing::info!("{}: bulk response carried {} photo(s)", institution.name, map.len()),
            Err(e) => tracing::warn!("{}: bulk photo call failed: {e}", institution.name),
        }
        (photos, attempts)
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
