//! Administrator queues, moderation reports, and owner-side availability controls.

use std::sync::PoisonError;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{
    Availability, Post, PostId, PostType, RentalTracking, Report, ReportId, ReportStatus, UserId,
    VerificationRequest,
};
use super::service::{VerificationWorkflowService, WorkflowError};
use crate::store::EntityStore;

/// Report joined with the post it targets, for administrator listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportView {
    pub post_id: PostId,
    pub post_title: String,
    pub report: Report,
}

impl<S> VerificationWorkflowService<S>
where
    S: EntityStore + 'static,
{
    pub fn list_pending_requests(
        &self,
        admin_id: &UserId,
        limit: usize,
    ) -> Result<Vec<VerificationRequest>, WorkflowError> {
        self.ensure_administrator(admin_id)?;
        Ok(self.store.pending_requests(limit)?)
    }

    pub fn rentals_for_user(&self, user: &UserId) -> Result<Vec<RentalTracking>, WorkflowError> {
        Ok(self.store.rentals_for_user(user)?)
    }

    /// Author override of an exchange post's availability, bypassing verification.
    ///
    /// Refused while the post has a non-completed rental so an override cannot strand the
    /// rental's return approval.
    pub fn set_availability(
        &self,
        post_id: &PostId,
        actor: &UserId,
        availability: Availability,
    ) -> Result<Post, WorkflowError> {
        let slot = self.locks.slot(post_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut post = self.live_post(post_id)?;
        if &post.author_id != actor {
            return Err(WorkflowError::Unauthorized(format!(
                "{actor} does not own post {post_id}"
            )));
        }
        if post.post_type != PostType::Exchange {
            return Err(WorkflowError::Validation(format!(
                "availability can only be set on exchange posts, not {}",
                post.post_type.label()
            )));
        }
        if let Some(rental) = self.store.active_rental_for_post(post_id)? {
            return Err(WorkflowError::StateConflict(format!(
                "post {post_id} has active rental {}",
                rental.id
            )));
        }

        let previous = post.availability;
        post.availability = availability;
        self.store.update_post(post.clone())?;
        info!(
            post_id = %post_id,
            from = previous.label(),
            to = availability.label(),
            "availability overridden by author"
        );
        Ok(post)
    }

    pub fn file_report(
        &self,
        post_id: &PostId,
        reporter: &UserId,
        reason: &str,
    ) -> Result<Report, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::Validation(
                "report reason is required".to_string(),
            ));
        }

        let slot = self.locks.slot(post_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut post = self.live_post(post_id)?;
        let duplicate = post.reports.iter().any(|report| {
            &report.reporter_id == reporter && report.status == ReportStatus::Pending
        });
        if duplicate {
            return Err(WorkflowError::StateConflict(format!(
                "{reporter} already has a pending report on post {post_id}"
            )));
        }

        let report = Report {
            id: self.store.next_report_id()?,
            reporter_id: reporter.clone(),
            reason: reason.to_string(),
            status: ReportStatus::Pending,
            timestamp: Utc::now(),
        };
        post.reports.push(report.clone());
        self.store.update_post(post)?;
        info!(post_id = %post_id, report_id = %report.id, "post reported");
        Ok(report)
    }

    pub fn list_reports(
        &self,
        admin_id: &UserId,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportView>, WorkflowError> {
        self.ensure_administrator(admin_id)?;

        let mut views: Vec<ReportView> = self
            .store
            .reported_posts()?
            .into_iter()
            .flat_map(|post| {
                let Post {
                    id, title, reports, ..
                } = post;
                reports
                    .into_iter()
                    .filter(move |report| status.map_or(true, |wanted| report.status == wanted))
                    .map(move |report| ReportView {
                        post_id: id.clone(),
                        post_title: title.clone(),
                        report,
                    })
            })
            .collect();
        views.sort_by(|a, b| a.report.timestamp.cmp(&b.report.timestamp));
        Ok(views)
    }

    pub fn update_report_status(
        &self,
        admin_id: &UserId,
        report_id: &ReportId,
        status: ReportStatus,
    ) -> Result<ReportView, WorkflowError> {
        self.ensure_administrator(admin_id)?;

        let post_id = self
            .store
            .post_for_report(report_id)?
            .map(|post| post.id)
            .ok_or_else(|| WorkflowError::NotFound(format!("report {report_id}")))?;

        let slot = self.locks.slot(&post_id);
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let mut post = self
            .store
            .fetch_post(&post_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("post {post_id}")))?;
        let report = post
            .reports
            .iter_mut()
            .find(|report| &report.id == report_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("report {report_id}")))?;
        report.status = status;
        let report = report.clone();

        let view = ReportView {
            post_id: post.id.clone(),
            post_title: post.title.clone(),
            report,
        };
        self.store.update_post(post)?;
        Ok(view)
    }
}
