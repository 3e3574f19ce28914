use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a listed item.
    PostId
);
id_type!(
    /// Identity issued by the authentication collaborator.
    UserId
);
id_type!(
    /// Identifier wrapper for verification requests.
    RequestId
);
id_type!(RentalId);
id_type!(NotificationId);
id_type!(ReportId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostType {
    LostFound,
    Marketplace,
    Exchange,
}

impl PostType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::LostFound => "lost-found",
            Self::Marketplace => "marketplace",
            Self::Exchange => "exchange",
        }
    }
}

/// Tri-state lifecycle flag governing whether new transactions may be proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Availability {
    #[default]
    Available,
    Reserved,
    Unavailable,
}

impl Availability {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Dismissed,
}

/// Moderation report owned by the post it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub reason: String,
    pub status: ReportStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub post_type: PostType,
    pub title: String,
    pub author_id: UserId,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub reports: Vec<Report>,
}

impl Post {
    pub fn new(
        id: PostId,
        post_type: PostType,
        title: impl Into<String>,
        author_id: UserId,
    ) -> Self {
        Self {
            id,
            post_type,
            title: title.into(),
            author_id,
            availability: Availability::Available,
            deleted: false,
            reports: Vec::new(),
        }
    }
}

/// Discriminant of a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Borrow,
    Rent,
    Swap,
    Purchase,
    Claim,
    Return,
}

impl RequestType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::Rent => "rent",
            Self::Swap => "swap",
            Self::Purchase => "purchase",
            Self::Claim => "claim",
            Self::Return => "return",
        }
    }

    /// Request types whose approval permanently takes the item off the market.
    pub const fn transfers_item(self) -> bool {
        matches!(
            self,
            Self::Borrow | Self::Swap | Self::Purchase | Self::Claim
        )
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalDuration {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: u32,
}

impl RentalDuration {
    /// Whole days between `start` and `end`, negative when the range is inverted.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayload {
    pub ownership_proof: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReturnPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rental_tracking_id: Option<RentalId>,
}

/// Type discriminant plus the variant-specific payload of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RequestKind {
    Borrow,
    Rent(RentalDuration),
    Swap,
    Purchase,
    Claim(ClaimPayload),
    Return(ReturnPayload),
}

impl RequestKind {
    pub const fn request_type(&self) -> RequestType {
        match self {
            Self::Borrow => RequestType::Borrow,
            Self::Rent(_) => RequestType::Rent,
            Self::Swap => RequestType::Swap,
            Self::Purchase => RequestType::Purchase,
            Self::Claim(_) => RequestType::Claim,
            Self::Return(_) => RequestType::Return,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Administrator verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub const fn status(self) -> VerificationStatus {
        match self {
            Self::Approved => VerificationStatus::Approved,
            Self::Rejected => VerificationStatus::Rejected,
        }
    }
}

/// Fields written by the single review action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub status: VerificationStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
}

/// A proposed transaction awaiting administrator adjudication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: RequestId,
    pub post_id: PostId,
    pub requester_id: UserId,
    pub kind: RequestKind,
    pub proof_images: Vec<String>,
    pub details: Option<String>,
    pub status: VerificationStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VerificationRequest {
    pub fn request_type(&self) -> RequestType {
        self.kind.request_type()
    }

    pub fn is_pending(&self) -> bool {
        self.status == VerificationStatus::Pending
    }

    pub(crate) fn apply_review(&mut self, review: ReviewRecord) {
        self.status = review.status;
        self.admin_notes = review.admin_notes;
        self.reviewed_by = Some(review.reviewed_by);
        self.reviewed_at = Some(review.reviewed_at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Active,
    ReturnedPending,
    ReturnedVerified,
    Overdue,
}

impl ReturnStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ReturnedPending => "returned_pending",
            Self::ReturnedVerified => "returned_verified",
            Self::Overdue => "overdue",
        }
    }
}

/// Record of an active or completed loan spawned by an approved rent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalTracking {
    pub id: RentalId,
    pub verification_request_id: RequestId,
    pub post_id: PostId,
    pub renter_id: UserId,
    pub owner_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_in_days: u32,
    pub return_status: ReturnStatus,
    pub last_notification_sent: Option<NaiveDate>,
    pub is_completed: bool,
}

impl RentalTracking {
    /// Whole calendar days until `end_date`; negative once the rental is overdue.
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days()
    }

    pub fn involves(&self, user: &UserId) -> bool {
        &self.renter_id == user || &self.owner_id == user
    }
}
