//! Legal transitions of a post's availability flag.
//!
//! Automated transitions are driven exclusively by approved verification requests; the only
//! other writer is the author's manual override on exchange posts.

use super::domain::{Availability, RequestType};

/// Event produced by an approved verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityTrigger {
    ApproveRent,
    /// `active_rental` reports whether the post had a non-completed rental at approval time.
    ApproveReturn { active_rental: bool },
    ApproveTransfer(RequestType),
}

impl AvailabilityTrigger {
    pub fn for_approval(request_type: RequestType, active_rental: bool) -> Self {
        match request_type {
            RequestType::Rent => Self::ApproveRent,
            RequestType::Return => Self::ApproveReturn { active_rental },
            other => Self::ApproveTransfer(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {trigger:?} while post is {from:?}")]
pub struct IllegalTransition {
    pub from: Availability,
    pub trigger: AvailabilityTrigger,
}

/// Resolve the availability that results from `trigger`, refusing anything outside the table.
pub fn transition(
    from: Availability,
    trigger: AvailabilityTrigger,
) -> Result<Availability, IllegalTransition> {
    use Availability::*;
    use AvailabilityTrigger::*;

    match (from, trigger) {
        (Available, ApproveRent) => Ok(Reserved),
        (Reserved, ApproveReturn { active_rental: true }) => Ok(Available),
        (Available, ApproveReturn { active_rental: false }) => Ok(Unavailable),
        (Available | Reserved, ApproveTransfer(kind)) if kind.transfers_item() => Ok(Unavailable),
        _ => Err(IllegalTransition { from, trigger }),
    }
}

/// Whether a new request of `request_type` may be proposed against a post in `state`.
pub fn accepts_requests(state: Availability, request_type: RequestType) -> bool {
    match state {
        Availability::Available => true,
        Availability::Reserved | Availability::Unavailable => request_type == RequestType::Return,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_reserves_only_available_posts() {
        assert_eq!(
            transition(Availability::Available, AvailabilityTrigger::ApproveRent),
            Ok(Availability::Reserved)
        );
        assert!(transition(Availability::Reserved, AvailabilityTrigger::ApproveRent).is_err());
        assert!(transition(Availability::Unavailable, AvailabilityTrigger::ApproveRent).is_err());
    }

    #[test]
    fn return_depends_on_active_rental() {
        let with_rental = AvailabilityTrigger::for_approval(RequestType::Return, true);
        let without_rental = AvailabilityTrigger::for_approval(RequestType::Return, false);

        assert_eq!(
            transition(Availability::Reserved, with_rental),
            Ok(Availability::Available)
        );
        assert_eq!(
            transition(Availability::Available, without_rental),
            Ok(Availability::Unavailable)
        );
        assert!(transition(Availability::Reserved, without_rental).is_err());
        assert!(transition(Availability::Available, with_rental).is_err());
        assert!(transition(Availability::Unavailable, with_rental).is_err());
    }

    #[test]
    fn transfers_close_available_and_reserved_posts() {
        for kind in [
            RequestType::Claim,
            RequestType::Purchase,
            RequestType::Borrow,
            RequestType::Swap,
        ] {
            let trigger = AvailabilityTrigger::for_approval(kind, false);
            assert_eq!(
                transition(Availability::Available, trigger),
                Ok(Availability::Unavailable)
            );
            assert_eq!(
                transition(Availability::Reserved, trigger),
                Ok(Availability::Unavailable)
            );
            assert!(transition(Availability::Unavailable, trigger).is_err());
        }
    }

    #[test]
    fn only_returns_are_accepted_once_an_item_is_committed() {
        assert!(accepts_requests(Availability::Available, RequestType::Rent));
        assert!(!accepts_requests(Availability::Reserved, RequestType::Purchase));
        assert!(!accepts_requests(Availability::Unavailable, RequestType::Claim));
        assert!(accepts_requests(Availability::Reserved, RequestType::Return));
        assert!(accepts_requests(Availability::Unavailable, RequestType::Return));
    }
}
