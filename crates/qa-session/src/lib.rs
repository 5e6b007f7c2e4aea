pub mod chat;
pub mod upload;
pub mod workspace;

#[cfg(test)]
pub(crate) mod mock;

pub use chat::{ChatSession, MessageView, PendingAsk, FAILURE_CONTENT};
pub use upload::{PendingReset, PendingUpload, UploadReceipt, UploadSession};
pub use workspace::{SessionConfig, Workspace};

pub use qa_error::{QaError, Result};
