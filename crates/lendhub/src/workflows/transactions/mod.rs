//! Item transactions: the availability state machine, administrator verification, and rental
//! reconciliation.
//!
//! Every workflow that reads a post's availability and then writes it runs under that post's
//! logical lock, so two approvals racing for the same item resolve to one winner and one
//! `StateConflict`.

pub mod availability;
pub mod directory;
pub mod domain;
mod locks;
pub mod moderation;
pub mod router;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod tests;

pub use availability::{accepts_requests, transition, AvailabilityTrigger, IllegalTransition};
pub use directory::{StaticUserDirectory, UserDirectory};
pub use domain::{
    Availability, ClaimPayload, Post, PostId, PostType, RentalDuration, RentalId, RentalTracking,
    Report, ReportId, ReportStatus, RequestId, RequestKind, RequestType, ReturnPayload,
    ReturnStatus, ReviewDecision, UserId, VerificationRequest, VerificationStatus,
};
pub use moderation::ReportView;
pub use router::transaction_router;
pub use scheduler::{spawn_rental_scheduler, ReminderKind, RentalScheduler, SchedulerReport};
pub use service::{
    RequestSubmission, ReviewOutcome, VerificationWorkflowService, WorkflowError,
};
