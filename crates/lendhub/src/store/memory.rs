use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use super::{
    NotificationRepository, PostRepository, RentalRepository, ReminderClaim, RepositoryError,
    VerificationRepository,
};
use crate::notifications::Notification;
use crate::workflows::transactions::domain::{
    NotificationId, Post, PostId, RentalId, RentalTracking, ReportId, RequestId, RequestKind,
    ReturnPayload, ReturnStatus, ReviewRecord, UserId, VerificationRequest,
};

#[derive(Debug, Default)]
struct Sequences {
    request: u64,
    rental: u64,
    notification: u64,
    report: u64,
}

/// Advance `counter` past any id already present in the table.
fn allocate(counter: &mut u64, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    loop {
        *counter += 1;
        let id = format!("{prefix}-{:06}", *counter);
        if !taken(&id) {
            return id;
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    posts: HashMap<PostId, Post>,
    requests: HashMap<RequestId, VerificationRequest>,
    rentals: HashMap<RentalId, RentalTracking>,
    notifications: Vec<Notification>,
    sequences: Sequences,
}

impl Tables {
    fn has_other_active_rental(&self, rental: &RentalTracking) -> bool {
        self.rentals.values().any(|existing| {
            existing.post_id == rental.post_id && !existing.is_completed && existing.id != rental.id
        })
    }
}

/// Process-local Entity Store; each call runs under one table lock.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<Tables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("entity store lock poisoned".to_string()))
    }
}

impl PostRepository for InMemoryEntityStore {
    fn next_report_id(&self) -> Result<ReportId, RepositoryError> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let posts = &tables.posts;
        let id = allocate(&mut tables.sequences.report, "rpt", |id| {
            posts
                .values()
                .flat_map(|post| post.reports.iter())
                .any(|report| report.id.as_str() == id)
        });
        Ok(ReportId::new(id))
    }

    fn insert_post(&self, post: Post) -> Result<Post, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.posts.contains_key(&post.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.posts.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    fn fetch_post(&self, id: &PostId) -> Result<Option<Post>, RepositoryError> {
        Ok(self.tables()?.posts.get(id).cloned())
    }

    fn update_post(&self, post: Post) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.posts.get_mut(&post.id) {
            Some(existing) => {
                *existing = post;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn reported_posts(&self) -> Result<Vec<Post>, RepositoryError> {
        let tables = self.tables()?;
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|post| !post.reports.is_empty())
            .cloned()
            .collect();
        posts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(posts)
    }

    fn post_for_report(&self, report: &ReportId) -> Result<Option<Post>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .posts
            .values()
            .find(|post| post.reports.iter().any(|entry| &entry.id == report))
            .cloned())
    }
}

impl VerificationRepository for InMemoryEntityStore {
    fn next_request_id(&self) -> Result<RequestId, RepositoryError> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let requests = &tables.requests;
        let id = allocate(&mut tables.sequences.request, "req", |id| {
            requests.contains_key(&RequestId::new(id))
        });
        Ok(RequestId::new(id))
    }

    fn insert_request(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationRequest, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch_request(&self, id: &RequestId) -> Result<Option<VerificationRequest>, RepositoryError> {
        Ok(self.tables()?.requests.get(id).cloned())
    }

    fn pending_requests(&self, limit: usize) -> Result<Vec<VerificationRequest>, RepositoryError> {
        let tables = self.tables()?;
        let mut pending: Vec<VerificationRequest> = tables
            .requests
            .values()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    fn pending_return_for_rental(
        &self,
        rental: &RentalId,
    ) -> Result<Option<VerificationRequest>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .requests
            .values()
            .find(|request| {
                request.is_pending()
                    && matches!(
                        &request.kind,
                        RequestKind::Return(ReturnPayload {
                            rental_tracking_id: Some(id),
                        }) if id == rental
                    )
            })
            .cloned())
    }

    fn record_review(
        &self,
        id: &RequestId,
        review: ReviewRecord,
    ) -> Result<VerificationRequest, RepositoryError> {
        let mut tables = self.tables()?;
        let request = tables.requests.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !request.is_pending() {
            return Err(RepositoryError::Conflict);
        }
        request.apply_review(review);
        Ok(request.clone())
    }
}

impl RentalRepository for InMemoryEntityStore {
    fn next_rental_id(&self) -> Result<RentalId, RepositoryError> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let rentals = &tables.rentals;
        let id = allocate(&mut tables.sequences.rental, "rent", |id| {
            rentals.contains_key(&RentalId::new(id))
        });
        Ok(RentalId::new(id))
    }

    fn insert_rental(&self, rental: RentalTracking) -> Result<RentalTracking, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.rentals.contains_key(&rental.id)
            || (!rental.is_completed && tables.has_other_active_rental(&rental))
        {
            return Err(RepositoryError::Conflict);
        }
        tables.rentals.insert(rental.id.clone(), rental.clone());
        Ok(rental)
    }

    fn fetch_rental(&self, id: &RentalId) -> Result<Option<RentalTracking>, RepositoryError> {
        Ok(self.tables()?.rentals.get(id).cloned())
    }

    fn update_rental(&self, rental: RentalTracking) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.rentals.contains_key(&rental.id) {
            return Err(RepositoryError::NotFound);
        }
        if !rental.is_completed && tables.has_other_active_rental(&rental) {
            return Err(RepositoryError::Conflict);
        }
        tables.rentals.insert(rental.id.clone(), rental);
        Ok(())
    }

    fn delete_rental(&self, id: &RentalId) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        tables
            .rentals
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn active_rental_for_post(
        &self,
        post: &PostId,
    ) -> Result<Option<RentalTracking>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .rentals
            .values()
            .find(|rental| &rental.post_id == post && !rental.is_completed)
            .cloned())
    }

    fn active_rentals(&self) -> Result<Vec<RentalTracking>, RepositoryError> {
        let tables = self.tables()?;
        let mut rentals: Vec<RentalTracking> = tables
            .rentals
            .values()
            .filter(|rental| !rental.is_completed)
            .cloned()
            .collect();
        rentals.sort_by(|a, b| a.end_date.cmp(&b.end_date).then(a.id.cmp(&b.id)));
        Ok(rentals)
    }

    fn rentals_for_user(&self, user: &UserId) -> Result<Vec<RentalTracking>, RepositoryError> {
        let tables = self.tables()?;
        let mut rentals: Vec<RentalTracking> = tables
            .rentals
            .values()
            .filter(|rental| rental.involves(user))
            .cloned()
            .collect();
        rentals.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(a.id.cmp(&b.id)));
        Ok(rentals)
    }

    fn transition_return_status(
        &self,
        id: &RentalId,
        from: ReturnStatus,
        to: ReturnStatus,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables()?;
        let rental = tables.rentals.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if rental.is_completed || rental.return_status != from {
            return Ok(false);
        }
        rental.return_status = to;
        Ok(true)
    }

    fn claim_reminder_slot(
        &self,
        id: &RentalId,
        today: NaiveDate,
    ) -> Result<Option<ReminderClaim>, RepositoryError> {
        let mut tables = self.tables()?;
        let rental = tables.rentals.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if rental.is_completed
            || rental.return_status != ReturnStatus::Active
            || rental.last_notification_sent == Some(today)
        {
            return Ok(None);
        }
        let previous = rental.last_notification_sent.replace(today);
        Ok(Some(ReminderClaim {
            previous,
            claimed: today,
        }))
    }

    fn release_reminder_slot(
        &self,
        id: &RentalId,
        claim: ReminderClaim,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let rental = tables.rentals.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if rental.last_notification_sent == Some(claim.claimed) {
            rental.last_notification_sent = claim.previous;
        }
        Ok(())
    }
}

impl NotificationRepository for InMemoryEntityStore {
    fn next_notification_id(&self) -> Result<NotificationId, RepositoryError> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;
        let notifications = &tables.notifications;
        let id = allocate(&mut tables.sequences.notification, "ntf", |id| {
            notifications.iter().any(|row| row.id.as_str() == id)
        });
        Ok(NotificationId::new(id))
    }

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .notifications
            .iter()
            .any(|existing| existing.id == notification.id)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.notifications.push(notification.clone());
        Ok(notification)
    }

    fn notifications_for(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|row| &row.recipient_id == recipient && (!unread_only || !row.is_read))
            .cloned()
            .collect())
    }

    fn unread_count(&self, recipient: &UserId) -> Result<usize, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .notifications
            .iter()
            .filter(|row| &row.recipient_id == recipient && !row.is_read)
            .count())
    }

    fn mark_read(
        &self,
        recipient: &UserId,
        id: &NotificationId,
    ) -> Result<Notification, RepositoryError> {
        let mut tables = self.tables()?;
        let row = tables
            .notifications
            .iter_mut()
            .find(|row| &row.id == id && &row.recipient_id == recipient)
            .ok_or(RepositoryError::NotFound)?;
        row.is_read = true;
        Ok(row.clone())
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, RepositoryError> {
        let mut tables = self.tables()?;
        let mut updated = 0;
        for row in tables
            .notifications
            .iter_mut()
            .filter(|row| &row.recipient_id == recipient && !row.is_read)
        {
            row.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}
