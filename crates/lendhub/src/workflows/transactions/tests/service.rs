use super::common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::notifications::{DeliveryChannel, LiveEvent, NotificationType, PresenceRegistry};
use crate::store::{PostRepository, RentalRepository, VerificationRepository};
use crate::workflows::transactions::domain::{
    Availability, ClaimPayload, PostId, PostType, RentalDuration, ReportStatus, RequestKind,
    ReturnPayload, ReturnStatus, ReviewDecision, UserId, VerificationStatus,
};
use crate::workflows::transactions::WorkflowError;

#[test]
fn approving_rent_reserves_post_and_opens_rental() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 5)))
        .expect("request accepted");

    let owner_inbox = inbox(&*harness.store, &owner());
    assert_eq!(owner_inbox.len(), 1);
    assert_eq!(
        owner_inbox[0].notification_type,
        NotificationType::VerificationPending
    );

    let outcome = harness
        .service
        .review(
            &request.id,
            ReviewDecision::Approved,
            &admin(),
            Some("ID checked".to_string()),
        )
        .expect("approval succeeds");

    assert_eq!(outcome.availability, Some(Availability::Reserved));
    assert_eq!(outcome.request.status, VerificationStatus::Approved);
    assert_eq!(outcome.request.reviewed_by, Some(admin()));
    let rental = outcome.rental.expect("rental opened");
    assert_eq!(rental.renter_id, renter());
    assert_eq!(rental.owner_id, owner());
    assert_eq!(rental.duration_in_days, 5);
    assert_eq!(rental.return_status, ReturnStatus::Active);
    assert!(!rental.is_completed);
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Reserved
    );

    let renter_inbox = inbox(&*harness.store, &renter());
    assert_eq!(
        renter_inbox[0].notification_type,
        NotificationType::VerificationApproved
    );
    assert!(renter_inbox[0].message.contains("ID checked"));
}

#[test]
fn reserved_posts_only_accept_returns() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 3)))
        .expect("request accepted");
    approve(&harness, &request.id);

    let blocked = harness
        .service
        .create_request(submission(&post, &watcher(), RequestKind::Borrow));
    assert!(matches!(blocked, Err(WorkflowError::StateConflict(_))));

    harness
        .service
        .create_request(submission(
            &post,
            &renter(),
            RequestKind::Return(ReturnPayload::default()),
        ))
        .expect("returns stay open on reserved posts");
}

#[test]
fn approving_return_completes_rental_and_frees_post() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 3)))
        .expect("request accepted");
    approve(&harness, &request.id);

    let return_request = harness
        .service
        .create_request(submission(
            &post,
            &renter(),
            RequestKind::Return(ReturnPayload::default()),
        ))
        .expect("return accepted");
    assert_eq!(
        inbox(&*harness.store, &admin())
            .iter()
            .filter(|row| row.notification_type == NotificationType::VerificationPending)
            .count(),
        1
    );

    let outcome = harness
        .service
        .review(&return_request.id, ReviewDecision::Approved, &admin(), None)
        .expect("return approved");

    assert_eq!(outcome.availability, Some(Availability::Available));
    let rental = outcome.rental.expect("rental completed");
    assert!(rental.is_completed);
    assert_eq!(rental.return_status, ReturnStatus::ReturnedVerified);
    assert!(harness
        .store
        .active_rental_for_post(&post)
        .expect("lookup")
        .is_none());
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Available
    );
}

#[test]
fn approving_return_without_rental_marks_post_unavailable() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::LostFound);
    let request = harness
        .service
        .create_request(submission(
            &post,
            &owner(),
            RequestKind::Return(ReturnPayload::default()),
        ))
        .expect("return accepted");

    let outcome = harness
        .service
        .review(&request.id, ReviewDecision::Approved, &admin(), None)
        .expect("approved");

    assert_eq!(outcome.availability, Some(Availability::Unavailable));
    assert!(outcome.rental.is_none());
}

#[test]
fn transfer_approval_fans_out_to_other_participants() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Marketplace);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), RequestKind::Purchase))
        .expect("request accepted");
    approve(&harness, &request.id);

    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Unavailable
    );
    let watcher_inbox = inbox(&*harness.store, &watcher());
    assert_eq!(watcher_inbox.len(), 1);
    assert_eq!(
        watcher_inbox[0].notification_type,
        NotificationType::ItemUnavailable
    );
    assert!(inbox(&*harness.store, &renter())
        .iter()
        .all(|row| row.notification_type != NotificationType::ItemUnavailable));
    assert!(inbox(&*harness.store, &owner())
        .iter()
        .all(|row| row.notification_type != NotificationType::ItemUnavailable));
}

#[test]
fn second_review_is_a_conflict_without_side_effects() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), RequestKind::Swap))
        .expect("request accepted");
    approve(&harness, &request.id);
    let notifications_before = inbox(&*harness.store, &renter()).len();

    let again = harness
        .service
        .review(&request.id, ReviewDecision::Rejected, &admin(), None);

    match again {
        Err(error @ WorkflowError::StateConflict(_)) => assert!(error.is_retryable()),
        other => panic!("expected conflict, got {other:?}"),
    }
    let stored = harness
        .store
        .fetch_request(&request.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, VerificationStatus::Approved);
    assert_eq!(inbox(&*harness.store, &renter()).len(), notifications_before);
}

#[test]
fn rejection_leaves_availability_untouched() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), RequestKind::Borrow))
        .expect("request accepted");

    let outcome = harness
        .service
        .review(
            &request.id,
            ReviewDecision::Rejected,
            &admin(),
            Some("Blurry photos".to_string()),
        )
        .expect("rejected");

    assert_eq!(outcome.request.status, VerificationStatus::Rejected);
    assert_eq!(outcome.availability, None);
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Available
    );
    let renter_inbox = inbox(&*harness.store, &renter());
    assert_eq!(
        renter_inbox[0].notification_type,
        NotificationType::VerificationRejected
    );
    assert!(renter_inbox[0].message.contains("Blurry photos"));
}

#[test]
fn only_administrators_review() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), RequestKind::Borrow))
        .expect("request accepted");

    let outcome = harness
        .service
        .review(&request.id, ReviewDecision::Approved, &owner(), None);

    assert!(matches!(outcome, Err(WorkflowError::Unauthorized(_))));
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Available
    );
}

#[test]
fn claims_require_proof_and_notify_nobody_on_creation() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::LostFound);

    let missing = harness.service.create_request(submission(
        &post,
        &renter(),
        RequestKind::Claim(ClaimPayload {
            ownership_proof: "  ".to_string(),
        }),
    ));
    assert!(matches!(missing, Err(WorkflowError::Validation(_))));

    harness
        .service
        .create_request(submission(
            &post,
            &renter(),
            RequestKind::Claim(ClaimPayload {
                ownership_proof: "Serial number 4411 engraved under the flap".to_string(),
            }),
        ))
        .expect("claim accepted");
    assert!(inbox(&*harness.store, &owner()).is_empty());
    assert!(inbox(&*harness.store, &admin()).is_empty());
}

#[test]
fn rent_duration_must_match_date_range() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);

    let mismatched = RequestKind::Rent(RentalDuration {
        start: date(2025, 10, 1),
        end: date(2025, 10, 4),
        days: 7,
    });
    let inverted = RequestKind::Rent(RentalDuration {
        start: date(2025, 10, 4),
        end: date(2025, 10, 1),
        days: 3,
    });

    for kind in [mismatched, inverted] {
        let outcome = harness
            .service
            .create_request(submission(&post, &renter(), kind));
        assert!(matches!(outcome, Err(WorkflowError::Validation(_))));
    }
}

#[test]
fn authors_cannot_request_their_own_post() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);

    let outcome = harness
        .service
        .create_request(submission(&post, &owner(), RequestKind::Borrow));

    assert!(matches!(outcome, Err(WorkflowError::Validation(_))));
}

#[test]
fn deleted_or_missing_posts_are_not_found() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let mut stored = harness
        .store
        .fetch_post(&post)
        .expect("fetch")
        .expect("present");
    stored.deleted = true;
    harness.store.update_post(stored).expect("soft delete");

    for target in [post, PostId::new("post-404")] {
        let outcome = harness
            .service
            .create_request(submission(&target, &renter(), RequestKind::Borrow));
        assert!(matches!(outcome, Err(WorkflowError::NotFound(_))));
    }
}

#[test]
fn failed_review_write_rolls_back_rent_approval() {
    let store = Arc::new(FlakyStore::default());
    let harness = harness_with(store.clone());
    let post = seed_post(&*store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 4)))
        .expect("request accepted");

    store.fail_reviews.store(true, Ordering::SeqCst);
    let outcome = harness
        .service
        .review(&request.id, ReviewDecision::Approved, &admin(), None);

    assert!(matches!(outcome, Err(WorkflowError::Internal(_))));
    assert_eq!(availability_of(&*store, &post), Availability::Available);
    assert!(store
        .active_rental_for_post(&post)
        .expect("lookup")
        .is_none());
    let stored = store
        .fetch_request(&request.id)
        .expect("fetch")
        .expect("present");
    assert!(stored.is_pending());

    store.fail_reviews.store(false, Ordering::SeqCst);
    approve(&harness, &request.id);
    assert_eq!(availability_of(&*store, &post), Availability::Reserved);
}

#[test]
fn failed_post_write_rolls_back_return_completion() {
    let store = Arc::new(FlakyStore::default());
    let harness = harness_with(store.clone());
    let post = seed_post(&*store, "post-1", PostType::Exchange);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 4)))
        .expect("request accepted");
    approve(&harness, &request.id);
    let return_request = harness
        .service
        .create_request(submission(
            &post,
            &renter(),
            RequestKind::Return(ReturnPayload::default()),
        ))
        .expect("return accepted");

    store.fail_post_updates.store(true, Ordering::SeqCst);
    let outcome = harness
        .service
        .review(&return_request.id, ReviewDecision::Approved, &admin(), None);

    assert!(matches!(outcome, Err(WorkflowError::Internal(_))));
    let rental = store
        .active_rental_for_post(&post)
        .expect("lookup")
        .expect("rental restored");
    assert_eq!(rental.return_status, ReturnStatus::Active);
    assert_eq!(availability_of(&*store, &post), Availability::Reserved);
}

#[test]
fn notification_failures_never_fail_the_transition() {
    let store = Arc::new(FlakyStore::default());
    let harness = harness_with(store.clone());
    let post = seed_post(&*store, "post-1", PostType::Exchange);

    store.fail_notifications.store(true, Ordering::SeqCst);
    let request = harness
        .service
        .create_request(submission(&post, &renter(), RequestKind::Swap))
        .expect("request still accepted");
    let outcome = harness
        .service
        .review(&request.id, ReviewDecision::Approved, &admin(), None)
        .expect("approval still succeeds");

    assert_eq!(outcome.availability, Some(Availability::Unavailable));
    assert!(inbox(&*store, &renter()).is_empty());
}

#[test]
fn online_requester_receives_live_decision() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let (channel, mut receiver) = DeliveryChannel::open();
    harness.presence.register(renter(), channel);

    let request = harness
        .service
        .create_request(submission(&post, &renter(), RequestKind::Borrow))
        .expect("request accepted");
    approve(&harness, &request.id);

    match receiver.try_recv().expect("live event pushed") {
        LiveEvent::Notification {
            notification,
            unread_count,
        } => {
            assert_eq!(
                notification.notification_type,
                NotificationType::VerificationApproved
            );
            assert_eq!(unread_count, 1);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn return_proof_moves_rental_to_pending_verification() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let rental_id = seed_rental(&*harness.store, &post, date(2025, 10, 6));
    let mut stored = harness
        .store
        .fetch_post(&post)
        .expect("fetch")
        .expect("present");
    stored.availability = Availability::Reserved;
    harness.store.update_post(stored).expect("reserve");

    let wrong_renter = harness.service.submit_return_proof(
        &rental_id,
        &watcher(),
        vec!["https://img.example/return.jpg".to_string()],
        None,
    );
    assert!(matches!(wrong_renter, Err(WorkflowError::Unauthorized(_))));

    let no_proof = harness
        .service
        .submit_return_proof(&rental_id, &renter(), vec![" ".to_string()], None);
    assert!(matches!(no_proof, Err(WorkflowError::Validation(_))));

    let (request, rental) = harness
        .service
        .submit_return_proof(
            &rental_id,
            &renter(),
            vec!["https://img.example/return.jpg".to_string()],
            Some("Dropped at the front desk".to_string()),
        )
        .expect("proof accepted");

    assert_eq!(rental.return_status, ReturnStatus::ReturnedPending);
    assert_eq!(
        request.kind,
        RequestKind::Return(ReturnPayload {
            rental_tracking_id: Some(rental_id.clone()),
        })
    );
    assert_eq!(inbox(&*harness.store, &admin()).len(), 1);

    let again = harness.service.submit_return_proof(
        &rental_id,
        &renter(),
        vec!["https://img.example/return.jpg".to_string()],
        None,
    );
    assert!(matches!(again, Err(WorkflowError::StateConflict(_))));

    approve(&harness, &request.id);
    let completed = harness
        .store
        .fetch_rental(&rental_id)
        .expect("fetch")
        .expect("present");
    assert!(completed.is_completed);
    assert_eq!(completed.return_status, ReturnStatus::ReturnedVerified);
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Available
    );
}

#[test]
fn transfers_wait_for_the_active_rental_to_be_returned() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let rent = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 5)))
        .expect("rent requested");
    let purchase = harness
        .service
        .create_request(submission(&post, &watcher(), RequestKind::Purchase))
        .expect("purchase requested while available");
    approve(&harness, &rent.id);

    let blocked = harness
        .service
        .review(&purchase.id, ReviewDecision::Approved, &admin(), None);
    assert!(matches!(blocked, Err(WorkflowError::StateConflict(_))));
    assert_eq!(availability_of(&*harness.store, &post), Availability::Reserved);
    let still_pending = harness
        .store
        .fetch_request(&purchase.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(still_pending.status, VerificationStatus::Pending);

    let rental = harness
        .store
        .active_rental_for_post(&post)
        .expect("lookup")
        .expect("rental open");
    let (returned, _) = harness
        .service
        .submit_return_proof(
            &rental.id,
            &renter(),
            vec!["https://img.example/return.jpg".to_string()],
            None,
        )
        .expect("proof accepted");
    approve(&harness, &returned.id);
    let completed = harness
        .store
        .fetch_rental(&rental.id)
        .expect("fetch")
        .expect("present");
    assert!(completed.is_completed);
    assert_eq!(availability_of(&*harness.store, &post), Availability::Available);

    approve(&harness, &purchase.id);
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Unavailable
    );
}

#[test]
fn rejected_return_can_be_resubmitted() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let rental_id = seed_rental(&*harness.store, &post, date(2025, 10, 6));
    let mut stored = harness
        .store
        .fetch_post(&post)
        .expect("fetch")
        .expect("present");
    stored.availability = Availability::Reserved;
    harness.store.update_post(stored).expect("reserve");
    let proof = || vec!["https://img.example/return.jpg".to_string()];

    let (first, _) = harness
        .service
        .submit_return_proof(&rental_id, &renter(), proof(), None)
        .expect("first proof accepted");
    harness
        .service
        .review(
            &first.id,
            ReviewDecision::Rejected,
            &admin(),
            Some("Photo is blurry".to_string()),
        )
        .expect("rejected");
    let after_rejection = harness
        .store
        .fetch_rental(&rental_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(after_rejection.return_status, ReturnStatus::ReturnedPending);
    assert!(!after_rejection.is_completed);

    let (second, rental) = harness
        .service
        .submit_return_proof(
            &rental_id,
            &renter(),
            proof(),
            Some("Clearer photo attached".to_string()),
        )
        .expect("renter may try again");
    assert_ne!(second.id, first.id);
    assert_eq!(rental.return_status, ReturnStatus::ReturnedPending);

    let duplicate = harness
        .service
        .submit_return_proof(&rental_id, &renter(), proof(), None);
    assert!(matches!(duplicate, Err(WorkflowError::StateConflict(_))));

    approve(&harness, &second.id);
    let completed = harness
        .store
        .fetch_rental(&rental_id)
        .expect("fetch")
        .expect("present");
    assert!(completed.is_completed);
    assert_eq!(availability_of(&*harness.store, &post), Availability::Available);
}

#[test]
fn failed_return_request_restores_rental_status_only() {
    let harness = harness_with(Arc::new(FlakyStore::default()));
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let rental_id = seed_rental(&*harness.store, &post, date(2025, 10, 1));
    let reminded = date(2025, 10, 3);
    harness
        .store
        .claim_reminder_slot(&rental_id, reminded)
        .expect("claim runs")
        .expect("slot free");
    assert!(harness
        .store
        .transition_return_status(&rental_id, ReturnStatus::Active, ReturnStatus::Overdue)
        .expect("marked overdue"));

    harness
        .store
        .fail_request_inserts
        .store(true, Ordering::SeqCst);
    let failed = harness.service.submit_return_proof(
        &rental_id,
        &renter(),
        vec!["https://img.example/return.jpg".to_string()],
        None,
    );
    assert!(matches!(failed, Err(WorkflowError::Internal(_))));

    let restored = harness
        .store
        .fetch_rental(&rental_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(restored.return_status, ReturnStatus::Overdue);
    assert_eq!(restored.last_notification_sent, Some(reminded));
    assert!(harness
        .store
        .pending_return_for_rental(&rental_id)
        .expect("lookup")
        .is_none());
}

#[test]
fn return_request_must_reference_a_rental_of_the_same_post() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let other = seed_post(&*harness.store, "post-2", PostType::Exchange);
    let foreign = seed_rental(&*harness.store, &other, date(2025, 10, 6));

    let outcome = harness.service.create_request(submission(
        &post,
        &renter(),
        RequestKind::Return(ReturnPayload {
            rental_tracking_id: Some(foreign),
        }),
    ));

    assert!(matches!(outcome, Err(WorkflowError::Validation(_))));
}

#[test]
fn concurrent_rent_approvals_produce_one_rental() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let first = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 3)))
        .expect("first request");
    let second = harness
        .service
        .create_request(submission(&post, &watcher(), rent_kind(date(2025, 10, 2), 3)))
        .expect("second request");

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = [&first.id, &second.id]
            .into_iter()
            .map(|id| {
                let service = &harness.service;
                scope.spawn(move || service.review(id, ReviewDecision::Approved, &admin(), None))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("review thread"))
            .collect()
    });

    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    let conflicted = results
        .iter()
        .filter(|result| matches!(result, Err(WorkflowError::StateConflict(_))))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(conflicted, 1);
    assert_eq!(harness.store.active_rentals().expect("list").len(), 1);
    assert_eq!(
        availability_of(&*harness.store, &post),
        Availability::Reserved
    );
}

#[test]
fn author_override_is_limited_to_exchange_posts_without_rentals() {
    let harness = harness();
    let exchange = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let marketplace = seed_post(&*harness.store, "post-2", PostType::Marketplace);

    let stranger = harness
        .service
        .set_availability(&exchange, &renter(), Availability::Unavailable);
    assert!(matches!(stranger, Err(WorkflowError::Unauthorized(_))));

    let wrong_type =
        harness
            .service
            .set_availability(&marketplace, &owner(), Availability::Unavailable);
    assert!(matches!(wrong_type, Err(WorkflowError::Validation(_))));

    let updated = harness
        .service
        .set_availability(&exchange, &owner(), Availability::Unavailable)
        .expect("override applied");
    assert_eq!(updated.availability, Availability::Unavailable);

    harness
        .service
        .set_availability(&exchange, &owner(), Availability::Available)
        .expect("reopened");
    seed_rental(&*harness.store, &exchange, date(2025, 10, 6));
    let blocked = harness
        .service
        .set_availability(&exchange, &owner(), Availability::Unavailable);
    assert!(matches!(blocked, Err(WorkflowError::StateConflict(_))));
}

#[test]
fn reports_are_deduplicated_and_moderated() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Marketplace);

    let empty = harness.service.file_report(&post, &renter(), "   ");
    assert!(matches!(empty, Err(WorkflowError::Validation(_))));

    let report = harness
        .service
        .file_report(&post, &renter(), "Listing looks like a scam")
        .expect("report filed");
    let duplicate = harness
        .service
        .file_report(&post, &renter(), "Still a scam");
    assert!(matches!(duplicate, Err(WorkflowError::StateConflict(_))));

    let forbidden = harness.service.list_reports(&renter(), None);
    assert!(matches!(forbidden, Err(WorkflowError::Unauthorized(_))));

    let pending = harness
        .service
        .list_reports(&admin(), Some(ReportStatus::Pending))
        .expect("listed");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].post_title, "Camping Tent");

    let view = harness
        .service
        .update_report_status(&admin(), &report.id, ReportStatus::Dismissed)
        .expect("updated");
    assert_eq!(view.report.status, ReportStatus::Dismissed);
    assert!(harness
        .service
        .list_reports(&admin(), Some(ReportStatus::Pending))
        .expect("listed")
        .is_empty());

    harness
        .service
        .file_report(&post, &renter(), "New problem after the edit")
        .expect("a fresh report is allowed once the first is closed");
}

#[test]
fn pending_queue_and_rental_listing() {
    let harness = harness();
    let post = seed_post(&*harness.store, "post-1", PostType::Exchange);
    let first = harness
        .service
        .create_request(submission(&post, &renter(), rent_kind(date(2025, 10, 1), 2)))
        .expect("first");
    harness
        .service
        .create_request(submission(&post, &watcher(), RequestKind::Borrow))
        .expect("second");

    let queue = harness
        .service
        .list_pending_requests(&admin(), 10)
        .expect("queue");
    assert_eq!(queue.len(), 2);
    assert_eq!(
        harness
            .service
            .list_pending_requests(&admin(), 1)
            .expect("queue")
            .len(),
        1
    );
    assert!(matches!(
        harness.service.list_pending_requests(&renter(), 10),
        Err(WorkflowError::Unauthorized(_))
    ));

    approve(&harness, &first.id);
    assert_eq!(
        harness
            .service
            .rentals_for_user(&renter())
            .expect("rentals")
            .len(),
        1
    );
    assert_eq!(
        harness
            .service
            .rentals_for_user(&owner())
            .expect("rentals")
            .len(),
        1
    );
    assert!(harness
        .service
        .rentals_for_user(&UserId::new("nobody"))
        .expect("rentals")
        .is_empty());
}
