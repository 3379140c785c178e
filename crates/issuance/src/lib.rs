//! Electronic receipt issuance engine.
//!
//! - [`sequence`]: atomic reservation of legal sequence numbers
//! - [`service`]: the issuance state machine (invoice, credit note, sync)
//! - [`reconciler`]: periodic re-drive of non-terminal receipts
//! - [`finalizer`]: RIDE rendering and email delivery after authorization

pub mod error;
pub mod finalizer;
pub mod reconciler;
pub mod sequence;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{IssuanceError, IssuanceResult};
pub use finalizer::{
    FinalizeJob, FinalizeOutcome, Finalizer, FinalizerHandle, FinalizerPool, FinalizerPoolConfig,
    FinalizerQueue, FinalizerStats, ScheduleError,
};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle};
pub use sequence::Reservation;
pub use service::{CreditNoteRequest, IssuanceConfig, IssuanceService, IssueOutcome, Repositories};
