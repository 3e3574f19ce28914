use crate::infra::{seed_demo_posts, Engine};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use lendhub::error::AppError;
use lendhub::notifications::Notification;
use lendhub::store::{NotificationRepository, PostRepository};
use lendhub::workflows::transactions::{
    ClaimPayload, PostId, RentalDuration, RequestKind, RequestSubmission, ReviewDecision,
    SchedulerReport, StaticUserDirectory, UserId, WorkflowError,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Override the scheduler date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

fn user(id: &str) -> UserId {
    UserId::new(id)
}

fn rent(start: NaiveDate, days: u32) -> RequestKind {
    RequestKind::Rent(RentalDuration {
        start,
        end: start + Duration::days(i64::from(days)),
        days,
    })
}

fn print_availability(engine: &Engine, post: &PostId) -> Result<(), AppError> {
    let availability = engine
        .store
        .fetch_post(post)
        .map_err(WorkflowError::from)?
        .map(|post| post.availability.label())
        .unwrap_or("missing");
    println!("  {post} availability: {availability}");
    Ok(())
}

fn print_inbox(engine: &Engine, recipient: &str) -> Result<(), AppError> {
    let rows: Vec<Notification> = engine
        .store
        .notifications_for(&user(recipient), false)
        .map_err(WorkflowError::from)?;
    println!("  {recipient} inbox ({} rows)", rows.len());
    for row in rows {
        println!(
            "    - [{}] {}: {}",
            row.notification_type.label(),
            row.title,
            row.message
        );
    }
    Ok(())
}

fn print_scheduler_pass(label: &str, report: &SchedulerReport) {
    println!(
        "  {label}: scanned {}, reminders {}, overdue {}, skipped {}, failures {}",
        report.scanned, report.reminders, report.overdue, report.skipped, report.failures
    );
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let directory = StaticUserDirectory::new([user("admin")]).with_conversation(
        PostId::new("post-wallet"),
        [
            user("finder"),
            user("claimant"),
            user("neighbor-1"),
            user("neighbor-2"),
        ],
    );
    let engine = Engine::new(directory);
    let seeded = seed_demo_posts(&engine.store)?;
    println!("LendHub transaction demo ({seeded} posts, today {today})");

    println!("\nRent approval");
    let drill = PostId::new("post-drill");
    let request = engine.service.create_request(RequestSubmission {
        post_id: drill.clone(),
        requester_id: user("borrower"),
        kind: rent(today, 5),
        proof_images: vec!["https://img.example/id-card.jpg".to_string()],
        details: Some("Weekend shelving project".to_string()),
    })?;
    let outcome = engine
        .service
        .review(&request.id, ReviewDecision::Approved, &user("admin"), None)?;
    print_availability(&engine, &drill)?;

    if let Some(rental) = outcome.rental {
        println!(
            "  rental {} due {} ({})",
            rental.id,
            rental.end_date,
            rental.return_status.label()
        );

        println!("\nVerified return");
        let (return_request, _) = engine.service.submit_return_proof(
            &rental.id,
            &user("borrower"),
            vec!["https://img.example/drill-returned.jpg".to_string()],
            None,
        )?;
        engine.service.review(
            &return_request.id,
            ReviewDecision::Approved,
            &user("admin"),
            Some("Drill and battery both present".to_string()),
        )?;
        print_availability(&engine, &drill)?;
    }
    print_inbox(&engine, "lender")?;

    println!("\nFound item claim");
    let wallet = PostId::new("post-wallet");
    let claim = engine.service.create_request(RequestSubmission {
        post_id: wallet.clone(),
        requester_id: user("claimant"),
        kind: RequestKind::Claim(ClaimPayload {
            ownership_proof: "Library card with my name behind the coin pocket".to_string(),
        }),
        proof_images: Vec::new(),
        details: None,
    })?;
    engine
        .service
        .review(&claim.id, ReviewDecision::Approved, &user("admin"), None)?;
    print_availability(&engine, &wallet)?;
    print_inbox(&engine, "neighbor-1")?;

    println!("\nOverdue sweep");
    let tent = PostId::new("post-tent");
    let late = engine.service.create_request(RequestSubmission {
        post_id: tent,
        requester_id: user("camper"),
        kind: rent(today - Duration::days(7), 5),
        proof_images: Vec::new(),
        details: None,
    })?;
    engine
        .service
        .review(&late.id, ReviewDecision::Approved, &user("admin"), None)?;
    let first = engine.scheduler.run_once(today)?;
    print_scheduler_pass("first pass", &first);
    let second = engine.scheduler.run_once(today)?;
    print_scheduler_pass("second pass", &second);
    print_inbox(&engine, "camper")?;

    Ok(())
}
