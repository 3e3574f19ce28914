//! Daily reconciliation of active rentals: due-date reminders and overdue transitions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::domain::{RentalTracking, ReturnStatus};
use super::service::WorkflowError;
use crate::notifications::{NotificationDispatcher, NotificationPayload, NotificationType};
use crate::store::{EntityStore, ReminderClaim, RepositoryError};

/// Reminder category for a rental, evaluated from days remaining until its end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    Overdue { days_overdue: u32 },
    DueToday,
    DueSoon { days: u32 },
    DueThisWeek { days: u32 },
}

impl ReminderKind {
    pub fn classify(days_remaining: i64) -> Option<Self> {
        match days_remaining {
            d if d < 0 => Some(Self::Overdue {
                days_overdue: u32::try_from(-d).unwrap_or(u32::MAX),
            }),
            0 => Some(Self::DueToday),
            1..=3 => Some(Self::DueSoon {
                days: days_remaining as u32,
            }),
            4..=7 => Some(Self::DueThisWeek {
                days: days_remaining as u32,
            }),
            _ => None,
        }
    }

    pub const fn notification_type(self) -> NotificationType {
        match self {
            Self::Overdue { .. } => NotificationType::RentalOverdue,
            _ => NotificationType::RentalReminder,
        }
    }

    fn payload(self, item: &str) -> NotificationPayload {
        let (title, message) = match self {
            Self::Overdue { days_overdue } => (
                "Rental overdue",
                format!(
                    "\"{item}\" is {days_overdue} {} overdue. Please return it as soon as possible.",
                    plural_days(days_overdue)
                ),
            ),
            Self::DueToday => ("Rental due today", format!("\"{item}\" is due today.")),
            Self::DueSoon { days } => (
                "Rental due soon",
                format!("\"{item}\" is due in {days} {}.", plural_days(days)),
            ),
            Self::DueThisWeek { days } => (
                "Rental reminder",
                format!("\"{item}\" is due in {days} days."),
            ),
        };
        NotificationPayload::new(self.notification_type(), title, message)
    }
}

fn plural_days(days: u32) -> &'static str {
    if days == 1 {
        "day"
    } else {
        "days"
    }
}

/// Counters for one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub scanned: usize,
    pub reminders: usize,
    pub overdue: usize,
    pub skipped: usize,
    pub failures: usize,
}

enum RentalOutcome {
    Reminded,
    MarkedOverdue,
    Skipped,
}

pub struct RentalScheduler<S> {
    store: Arc<S>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl<S> RentalScheduler<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Process every active rental for `today`; a failure on one rental never stops the rest.
    pub fn run_once(&self, today: NaiveDate) -> Result<SchedulerReport, WorkflowError> {
        let mut report = SchedulerReport::default();

        for rental in self.store.active_rentals()? {
            if rental.return_status != ReturnStatus::Active {
                continue;
            }
            report.scanned += 1;

            match self.process(&rental, today) {
                Ok(RentalOutcome::Reminded) => report.reminders += 1,
                Ok(RentalOutcome::MarkedOverdue) => report.overdue += 1,
                Ok(RentalOutcome::Skipped) => report.skipped += 1,
                Err(error) => {
                    report.failures += 1;
                    error!(rental_id = %rental.id, %error, "rental reconciliation failed");
                }
            }
        }

        info!(
            %today,
            scanned = report.scanned,
            reminders = report.reminders,
            overdue = report.overdue,
            skipped = report.skipped,
            failures = report.failures,
            "rental scheduler pass complete"
        );
        Ok(report)
    }

    fn process(
        &self,
        rental: &RentalTracking,
        today: NaiveDate,
    ) -> Result<RentalOutcome, RepositoryError> {
        if rental.last_notification_sent == Some(today) {
            return Ok(RentalOutcome::Skipped);
        }
        let Some(kind) = ReminderKind::classify(rental.days_remaining(today)) else {
            return Ok(RentalOutcome::Skipped);
        };

        let Some(claim) = self.store.claim_reminder_slot(&rental.id, today)? else {
            debug!(rental_id = %rental.id, "reminder already sent today");
            return Ok(RentalOutcome::Skipped);
        };

        let overdue = matches!(kind, ReminderKind::Overdue { .. });
        if overdue {
            let marked = self
                .store
                .transition_return_status(&rental.id, ReturnStatus::Active, ReturnStatus::Overdue)
                .inspect_err(|_| self.release(rental, claim))?;
            if !marked {
                self.release(rental, claim);
                return Ok(RentalOutcome::Skipped);
            }
        }

        let item = match self.store.fetch_post(&rental.post_id) {
            Ok(Some(post)) => post.title,
            _ => "Your rental".to_string(),
        };
        let payload = kind
            .payload(&item)
            .with_post(&rental.post_id)
            .with_user(&rental.owner_id);

        if let Err(error) = self.dispatcher.notify(&rental.renter_id, payload) {
            if overdue {
                self.restore_active(rental);
            }
            self.release(rental, claim);
            return Err(error);
        }

        Ok(match kind {
            ReminderKind::Overdue { .. } => RentalOutcome::MarkedOverdue,
            _ => RentalOutcome::Reminded,
        })
    }

    fn release(&self, rental: &RentalTracking, claim: ReminderClaim) {
        if let Err(error) = self.store.release_reminder_slot(&rental.id, claim) {
            warn!(rental_id = %rental.id, %error, "unable to release reminder slot");
        }
    }

    fn restore_active(&self, rental: &RentalTracking) {
        let restored = self.store.transition_return_status(
            &rental.id,
            ReturnStatus::Overdue,
            ReturnStatus::Active,
        );
        if let Err(error) = restored {
            warn!(rental_id = %rental.id, %error, "unable to restore rental status");
        }
    }
}

/// Run the scheduler on a fixed period using the local calendar date.
pub fn spawn_rental_scheduler<S>(
    scheduler: Arc<RentalScheduler<S>>,
    period: Duration,
) -> JoinHandle<()>
where
    S: EntityStore + 'static,
{
    info!(interval_secs = period.as_secs(), "rental scheduler started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let today = Local::now().date_naive();
            let scheduler = Arc::clone(&scheduler);
            match tokio::task::spawn_blocking(move || scheduler.run_once(today)).await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => error!(%error, "rental scheduler pass aborted"),
                Err(error) => error!(%error, "rental scheduler task panicked"),
            }
        }
    })
}
