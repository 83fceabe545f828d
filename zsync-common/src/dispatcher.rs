//! Report rendering and upload pool.
//!
//! After the engine has written its output file, every queued
//! [`PendingUpload`] is turned into a single-test HTML report by an external
//! renderer and attached to its execution or step result. Items run on a
//! bounded pool of blocking workers; each item's failure is captured in the
//! [`DispatchSummary`] and never stops its siblings.

use crate::client::{TrackerClient, TransportError};
use crate::errors::ErrorCode;
use crate::types::PendingUpload;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to run report renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("report renderer failed: {0}")]
    Failed(String),
}

/// Produces a single-test report from the engine output.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, output: &Path, longname: &str, report: &Path) -> Result<(), RenderError>;
}

/// Renderer that shells out to `rebot`-compatible tooling:
/// `<program> --test <longname> --report NONE --log <report> <output>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRenderer {
    program: String,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(output: &Path, longname: &str, report: &Path) -> Vec<String> {
        vec![
            "--test".to_string(),
            longname.to_string(),
            "--report".to_string(),
            "NONE".to_string(),
            "--log".to_string(),
            report.display().to_string(),
            output.display().to_string(),
        ]
    }
}

impl ReportRenderer for CommandRenderer {
    fn render(&self, output: &Path, longname: &str, report: &Path) -> Result<(), RenderError> {
        let result = Command::new(&self.program)
            .args(Self::args(output, longname, report))
            .output()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        // The renderer exits non-zero whenever the rendered test failed.
        if !result.status.success() {
            debug!(
                program = %self.program,
                status = ?result.status.code(),
                test = longname,
                "report renderer exited with non-zero status"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rendering report for '{longname}' failed: {source}")]
    Render {
        longname: String,
        #[source]
        source: RenderError,
    },

    #[error("report {} was not produced", .0.display())]
    ReportMissing(PathBuf),

    #[error("report upload failed: {0}")]
    Upload(#[from] TransportError),

    #[error("upload worker failed: {0}")]
    Worker(String),

    #[error("failed to start upload runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Render { .. } => ErrorCode::ReportRendererFailed,
            Self::ReportMissing(_) => ErrorCode::ReportOutputMissing,
            Self::Upload(_) => ErrorCode::ReportUploadFailed,
            Self::Worker(_) | Self::Runtime(_) => ErrorCode::InternalRuntimeError,
        }
    }
}

/// One item that could not be uploaded.
#[derive(Debug)]
pub struct UploadFailure {
    pub upload: PendingUpload,
    pub error: DispatchError,
}

#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Entity ids whose report was attached.
    pub uploaded: Vec<String>,
    pub failures: Vec<UploadFailure>,
}

impl DispatchSummary {
    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Bounded pool rendering and uploading single-test reports.
#[derive(Clone)]
pub struct ReportDispatcher {
    client: TrackerClient,
    renderer: Arc<dyn ReportRenderer>,
    workers: usize,
}

impl std::fmt::Debug for ReportDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportDispatcher")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Path of the report rendered for `upload` next to the engine output.
pub fn report_path(output: &Path, upload: &PendingUpload) -> PathBuf {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    dir.join(format!("{}.html", upload.entity_id()))
}

fn process(
    client: &TrackerClient,
    renderer: &dyn ReportRenderer,
    output: &Path,
    upload: &PendingUpload,
) -> Result<(), DispatchError> {
    let report = report_path(output, upload);
    let rendered = renderer.render(output, upload.longname(), &report);
    if !report.exists() {
        return Err(match rendered {
            Err(source) => DispatchError::Render {
                longname: upload.longname().to_string(),
                source,
            },
            Ok(()) => DispatchError::ReportMissing(report),
        });
    }
    if let Err(err) = &rendered {
        warn!(test = upload.longname(), error = %err, "renderer reported an error, uploading partial report");
    }

    let attached = client.attach(upload.entity_id(), upload.entity_type(), &report);
    if let Err(err) = std::fs::remove_file(&report) {
        debug!(report = %report.display(), error = %err, "could not remove rendered report");
    }
    attached?;
    Ok(())
}

impl ReportDispatcher {
    pub fn new(client: TrackerClient, renderer: Arc<dyn ReportRenderer>, workers: usize) -> Self {
        Self {
            client,
            renderer,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Render and upload every item, then wait for all of them.
    pub fn dispatch(
        &self,
        output: &Path,
        uploads: Vec<PendingUpload>,
    ) -> Result<DispatchSummary, DispatchError> {
        if uploads.is_empty() {
            debug!("no report uploads queued");
            return Ok(DispatchSummary::default());
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(self.workers)
            .build()
            .map_err(DispatchError::Runtime)?;
        let summary = runtime.block_on(self.run(output.to_path_buf(), uploads));
        info!(
            uploaded = summary.uploaded.len(),
            failed = summary.failures.len(),
            "report uploads finished"
        );
        Ok(summary)
    }

    async fn run(&self, output: PathBuf, uploads: Vec<PendingUpload>) -> DispatchSummary {
        let permits = Arc::new(Semaphore::new(self.workers));
        let output = Arc::new(output);
        let mut outstanding = uploads.clone();
        let mut tasks = JoinSet::new();

        for upload in uploads {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                warn!("upload pool closed, remaining reports not dispatched");
                break;
            };
            let client = self.client.clone();
            let renderer = Arc::clone(&self.renderer);
            let output = Arc::clone(&output);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = process(&client, renderer.as_ref(), &output, &upload);
                (upload, result)
            });
        }

        let mut summary = DispatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (upload, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    warn!(
                        code = %ErrorCode::InternalRuntimeError.code_string(),
                        error = %err,
                        "upload task aborted"
                    );
                    continue;
                }
            };
            if let Some(index) = outstanding.iter().position(|item| item == &upload) {
                outstanding.swap_remove(index);
            }
            match result {
                Ok(()) => {
                    debug!(entity_id = upload.entity_id(), "report attached");
                    summary.uploaded.push(upload.entity_id().to_string());
                }
                Err(error) => {
                    warn!(
                        code = %error.code().code_string(),
                        entity_id = upload.entity_id(),
                        test = upload.longname(),
                        error = %error,
                        "report upload failed"
                    );
                    summary.failures.push(UploadFailure { upload, error });
                }
            }
        }

        // Items whose task panicked, was cancelled or never started.
        for upload in outstanding {
            summary.failures.push(UploadFailure {
                upload,
                error: DispatchError::Worker("upload task did not complete".to_string()),
            });
        }
        summary
    }
}
