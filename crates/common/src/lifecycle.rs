//! Delivery lifecycle state machine.
//!
//! Every status change a record can undergo is expressed as a
//! [`LifecycleEvent`] applied to its current [`DeliveryStatus`]:
//!
//! ```text
//! [created] --intake--> Pending --delivered--> Success (terminal)
//!                          |--failed--> Failed --claimed--> Pending
//! ```
//!
//! Failed records whose retry budget is spent stay `Failed` forever; the
//! sweep simply stops selecting them.

use crate::error::DeliveryError;
use crate::types::DeliveryStatus;

/// Something that happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The callback endpoint answered 200.
    Delivered,
    /// The attempt failed (transport error, non-200, unreadable body).
    AttemptFailed,
    /// A retry sweep took ownership of a failed record.
    Claimed,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::Delivered => write!(f, "delivered"),
            LifecycleEvent::AttemptFailed => write!(f, "attempt_failed"),
            LifecycleEvent::Claimed => write!(f, "claimed"),
        }
    }
}

impl DeliveryStatus {
    /// Apply `event` to this status, returning the resulting status.
    pub fn transition(self, event: LifecycleEvent) -> Result<DeliveryStatus, DeliveryError> {
        match (self, event) {
            (DeliveryStatus::Pending, LifecycleEvent::Delivered) => Ok(DeliveryStatus::Success),
            (DeliveryStatus::Pending, LifecycleEvent::AttemptFailed) => Ok(DeliveryStatus::Failed),
            (DeliveryStatus::Failed, LifecycleEvent::Claimed) => Ok(DeliveryStatus::Pending),
            (DeliveryStatus::Pending, LifecycleEvent::Claimed)
            | (DeliveryStatus::Failed, LifecycleEvent::Delivered)
            | (DeliveryStatus::Failed, LifecycleEvent::AttemptFailed)
            | (DeliveryStatus::Success, _) => Err(DeliveryError::InvalidTransition {
                from: self,
                event,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_to_success_on_delivery() {
        assert_eq!(
            DeliveryStatus::Pending.transition(LifecycleEvent::Delivered).unwrap(),
            DeliveryStatus::Success
        );
    }

    #[test]
    fn test_pending_to_failed_on_failed_attempt() {
        assert_eq!(
            DeliveryStatus::Pending
                .transition(LifecycleEvent::AttemptFailed)
                .unwrap(),
            DeliveryStatus::Failed
        );
    }

    #[test]
    fn test_failed_to_pending_on_claim() {
        assert_eq!(
            DeliveryStatus::Failed.transition(LifecycleEvent::Claimed).unwrap(),
            DeliveryStatus::Pending
        );
    }

    #[test]
    fn test_success_is_terminal() {
        for event in [
            LifecycleEvent::Delivered,
            LifecycleEvent::AttemptFailed,
            LifecycleEvent::Claimed,
        ] {
            let err = DeliveryStatus::Success.transition(event).unwrap_err();
            assert!(matches!(err, DeliveryError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_claiming_pending_record_is_rejected() {
        assert!(
            DeliveryStatus::Pending
                .transition(LifecycleEvent::Claimed)
                .is_err()
        );
    }

    #[test]
    fn test_failed_record_cannot_record_outcome_without_claim() {
        assert!(
            DeliveryStatus::Failed
                .transition(LifecycleEvent::Delivered)
                .is_err()
        );
        assert!(
            DeliveryStatus::Failed
                .transition(LifecycleEvent::AttemptFailed)
                .is_err()
        );
    }
}
