pub mod delete_sync;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod models;
pub mod schema;
pub mod session;
pub mod source;
pub mod statements;
pub mod writer;

pub use delete_sync::{DeleteSyncReport, DeleteSyncStatus, DeleteSynchronizer};
pub use engine::{CopyJob, CopyOrchestrator, CopyTask, SourceUnit};
pub use error::CopyError;
pub use mapper::{ColumnMapping, ColumnRename};
pub use models::{
    CommitInterval, CopyJobState, CopyOptions, CopySettings, DeleteTargetPolicy, DropPolicy,
    Outcome, TransactionPolicy, WriteMode,
};
pub use session::{CopySession, SessionOutcome};
pub use source::{CancelHandle, ProgressCallback, RowReceiver, RowSource, SourceEnd};
pub use writer::TableWriter;
