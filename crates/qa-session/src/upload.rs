//! Lifecycle of the one document bound to a session.
//!
//! ```text
//! idle ──select──▶ selected ──submit──▶ uploading ──▶ succeeded | failed
//!   ▲                                                      │
//!   └──────────────────────── reset ◀──────────────────────┘
//! ```
//!
//! Remote calls are split into `begin_*` / `complete_*` halves so an event
//! loop can keep handling input while a call is outstanding. Every pending
//! call carries the generation it was issued under; `reset` starts a new
//! generation and late results from an older one are dropped.

use qa_client::Backend;
use qa_core::{ResetResponse, UploadFile, UploadPhase, UploadResponse, UploadState};
use qa_error::{ErrorMetadataBuilder, QaError, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub document_id: Option<String>,
    pub file_name: String,
}

/// An upload that has left the session and awaits its outcome.
#[derive(Debug)]
pub struct PendingUpload {
    generation: u64,
    file: UploadFile,
}

impl PendingUpload {
    pub fn file(&self) -> &UploadFile {
        &self.file
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PendingReset {
    generation: u64,
}

#[derive(Debug, Default)]
pub struct UploadSession {
    state: UploadState,
    file: Option<UploadFile>,
    generation: u64,
    /// Generation opened by the outstanding remote reset, if any.
    reset_in_flight: Option<u64>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn phase(&self) -> UploadPhase {
        self.state.phase
    }

    pub fn document_id(&self) -> Option<&str> {
        self.state.document_id.as_deref()
    }

    pub fn is_resetting(&self) -> bool {
        self.reset_in_flight.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.state.phase == UploadPhase::Uploading
    }

    /// Picks the file to upload. Anything but `application/pdf` is rejected
    /// before touching state.
    pub fn select(&mut self, file: UploadFile) -> Result<()> {
        if !file.is_pdf() {
            return Err(QaError::Validation {
                message: "Only PDF files are allowed.".to_string(),
            });
        }
        if self.is_busy() {
            return Err(QaError::Busy {
                operation: "upload".to_string(),
            });
        }

        info!(file = %file.name, bytes = file.data.len(), "file selected");
        self.state.phase = UploadPhase::Selected;
        self.state.file_name = Some(file.name.clone());
        self.state.last_error = None;
        self.file = Some(file);
        Ok(())
    }

    /// Moves a selected file into `uploading`. `None` when there is nothing
    /// to submit.
    pub fn begin_submit(&mut self) -> Option<PendingUpload> {
        if self.state.phase != UploadPhase::Selected {
            debug!(phase = %self.state.phase, "submit ignored");
            return None;
        }
        let file = self.file.take()?;
        self.state.phase = UploadPhase::Uploading;
        Some(PendingUpload {
            generation: self.generation,
            file,
        })
    }

    /// Folds an upload outcome into the state. Returns `None` when the
    /// upload was superseded by a reset.
    pub fn complete_submit(
        &mut self,
        pending: PendingUpload,
        outcome: Result<UploadResponse>,
    ) -> Option<Result<UploadReceipt>> {
        if pending.generation != self.generation {
            debug!(
                issued = pending.generation,
                current = self.generation,
                "discarding stale upload result"
            );
            return None;
        }

        match outcome {
            Ok(resp) => {
                let file_name = if resp.filename.trim().is_empty() {
                    pending.file.name
                } else {
                    resp.filename
                };
                info!(file = %file_name, document_id = ?resp.document_id, chunks = ?resp.chunks_count, "upload succeeded");
                self.state = UploadState {
                    phase: UploadPhase::Succeeded,
                    file_name: Some(file_name.clone()),
                    document_id: resp.document_id.clone(),
                    last_error: None,
                };
                Some(Ok(UploadReceipt {
                    document_id: resp.document_id,
                    file_name,
                }))
            }
            Err(err) => {
                let err = err.into_upload();
                let meta = ErrorMetadataBuilder::new("upload_session")
                    .operation("upload")
                    .document_id(self.document_id())
                    .generation(self.generation)
                    .context("file", &pending.file.name)
                    .build(&err);
                err.log(&meta);
                // A failed re-upload must not leave the previous document bound.
                self.state = UploadState {
                    phase: UploadPhase::Failed,
                    file_name: None,
                    document_id: None,
                    last_error: Some(err.user_message()),
                };
                Some(Err(err))
            }
        }
    }

    /// Uploads the selected file. `Ok(None)` when no file is selected.
    pub async fn submit(&mut self, backend: &dyn Backend) -> Result<Option<UploadReceipt>> {
        let Some(pending) = self.begin_submit() else {
            return Ok(None);
        };
        let outcome = backend.upload(pending.file()).await;
        self.complete_submit(pending, outcome).transpose()
    }

    /// Returns to a clean `idle` immediately and opens a new generation.
    /// Only one remote reset may be outstanding at a time.
    pub fn begin_reset(&mut self) -> Result<PendingReset> {
        if self.reset_in_flight.is_some() {
            return Err(QaError::Busy {
                operation: "reset".to_string(),
            });
        }
        self.generation += 1;
        self.state = UploadState::default();
        self.file = None;
        self.reset_in_flight = Some(self.generation);
        info!(generation = self.generation, "upload session reset");
        Ok(PendingReset {
            generation: self.generation,
        })
    }

    /// Records a failed remote reset as `last_error`; local state stays idle.
    pub fn complete_reset(
        &mut self,
        pending: PendingReset,
        outcome: Result<ResetResponse>,
    ) -> Result<ResetResponse> {
        if self.reset_in_flight == Some(pending.generation) {
            self.reset_in_flight = None;
        }
        outcome.map_err(|err| {
            let err = err.into_reset();
            let meta = ErrorMetadataBuilder::new("upload_session")
                .operation("reset")
                .generation(pending.generation)
                .build(&err);
            err.log(&meta);
            if pending.generation == self.generation {
                self.state.last_error = Some(err.user_message());
            }
            err
        })
    }

    pub async fn reset(&mut self, backend: &dyn Backend) -> Result<ResetResponse> {
        let pending = self.begin_reset()?;
        let outcome = backend.reset().await;
        self.complete_reset(pending, outcome)
    }
}
