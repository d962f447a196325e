//! Booking workflow state machine.
//!
//! Pure transition rules for safehouse bookings.  The rules here say which
//! status moves are legal and how each move changes the safehouse bed
//! counters; [`crate::storage`] applies them inside a single SQLite
//! transaction so a status change and its capacity effect are one atomic
//! unit.
//!
//! ```text
//! pending -> approved -> checked_in -> checked_out
//!    |           |
//!    +-> rejected/cancelled (pre-check-in only)
//! ```
//!
//! Bed bookkeeping per move, preserving
//! `available + reserved + occupied == total`:
//! - reserve (booking created): available -1, reserved +1
//! - approve: no change (bed stays reserved)
//! - reject / cancel: reserved -1, available +1
//! - check-in: reserved -1, occupied +1
//! - check-out: occupied -1, available +1

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    CheckedIn,
    CheckedOut,
    Rejected,
    Cancelled,
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::CheckedOut => "checked_out",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "checked_in" => Ok(BookingStatus::CheckedIn),
            "checked_out" => Ok(BookingStatus::CheckedOut),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("invalid booking status: {s}")),
        }
    }
}

impl BookingStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::CheckedOut | BookingStatus::Rejected | BookingStatus::Cancelled
        )
    }

    /// Whether `self -> to` is a legal status move.
    pub fn allows(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, CheckedIn)
                | (Approved, Cancelled)
                | (CheckedIn, CheckedOut)
        )
    }

    /// Intake, safety assessment, and service activation are recorded before
    /// the resident arrives.
    pub fn accepts_admission_updates(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    /// Transport details may change any time before the stay ends.
    pub fn accepts_transport_updates(&self) -> bool {
        !self.is_terminal()
    }
}

/// Counter adjustments for one transition.  Applied to the owning safehouse
/// in the same transaction as the status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BedDelta {
    pub available: i64,
    pub reserved: i64,
    pub occupied: i64,
}

impl BedDelta {
    pub fn is_noop(&self) -> bool {
        self.available == 0 && self.reserved == 0 && self.occupied == 0
    }
}

/// Bed-counter effect of a legal transition.  `from -> to` must already have
/// passed [`BookingStatus::allows`].
pub fn bed_delta(from: BookingStatus, to: BookingStatus) -> BedDelta {
    use BookingStatus::*;
    match (from, to) {
        (Pending, Rejected) | (Pending, Cancelled) | (Approved, Cancelled) => BedDelta {
            available: 1,
            reserved: -1,
            occupied: 0,
        },
        (Approved, CheckedIn) => BedDelta {
            available: 0,
            reserved: -1,
            occupied: 1,
        },
        (CheckedIn, CheckedOut) => BedDelta {
            available: 1,
            reserved: 0,
            occupied: -1,
        },
        _ => BedDelta::default(),
    }
}

/// Bed-counter effect of creating a reservation.
pub fn reserve_delta() -> BedDelta {
    BedDelta {
        available: -1,
        reserved: 1,
        occupied: 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportStatus {
    NotRequired,
    Requested,
    Arranged,
    InTransit,
    Completed,
}

impl std::fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportStatus::NotRequired => "not_required",
            TransportStatus::Requested => "requested",
            TransportStatus::Arranged => "arranged",
            TransportStatus::InTransit => "in_transit",
            TransportStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TransportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "not_required" => Ok(TransportStatus::NotRequired),
            "requested" => Ok(TransportStatus::Requested),
            "arranged" => Ok(TransportStatus::Arranged),
            "in_transit" => Ok(TransportStatus::InTransit),
            "completed" => Ok(TransportStatus::Completed),
            _ => Err(format!("invalid transport status: {s}")),
        }
    }
}

impl TransportStatus {
    fn rank(&self) -> u8 {
        match self {
            TransportStatus::NotRequired => 0,
            TransportStatus::Requested => 1,
            TransportStatus::Arranged => 2,
            TransportStatus::InTransit => 3,
            TransportStatus::Completed => 4,
        }
    }

    /// Transport advances strictly forward, never backwards or in place.
    pub fn allows(&self, to: TransportStatus) -> bool {
        to.rank() > self.rank()
    }
}

#[derive(Debug)]
pub enum WorkflowError {
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    InvalidTransportTransition {
        from: TransportStatus,
        to: TransportStatus,
    },
    /// No available bed at the safehouse.
    NoCapacity,
    /// Check-in requires a completed safety assessment.
    AssessmentRequired,
    /// Admission payloads (intake, assessment, services) only apply before
    /// check-in.
    AdmissionClosed(BookingStatus),
    /// A live booking already exists for this identity and safehouse.
    AlreadyBooked,
    NotFound(String),
    Storage(StorageError),
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowError::InvalidTransition { from, to } => {
                write!(f, "invalid booking transition: {from} -> {to}")
            }
            WorkflowError::InvalidTransportTransition { from, to } => {
                write!(f, "invalid transport transition: {from} -> {to}")
            }
            WorkflowError::NoCapacity => write!(f, "no available beds"),
            WorkflowError::AssessmentRequired => {
                write!(f, "safety assessment must be completed before check-in")
            }
            WorkflowError::AdmissionClosed(status) => {
                write!(f, "admission updates not accepted in status {status}")
            }
            WorkflowError::AlreadyBooked => {
                write!(f, "a live booking already exists for this safehouse")
            }
            WorkflowError::NotFound(what) => write!(f, "not found: {what}"),
            WorkflowError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        WorkflowError::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(Pending.allows(Approved));
        assert!(Approved.allows(CheckedIn));
        assert!(CheckedIn.allows(CheckedOut));
    }

    #[test]
    fn early_exits_are_legal() {
        assert!(Pending.allows(Rejected));
        assert!(Pending.allows(Cancelled));
        assert!(Approved.allows(Cancelled));
    }

    #[test]
    fn skipping_and_reversing_are_illegal() {
        assert!(!Pending.allows(CheckedIn));
        assert!(!Pending.allows(CheckedOut));
        assert!(!Approved.allows(Pending));
        assert!(!CheckedIn.allows(Approved));
        assert!(!CheckedIn.allows(Cancelled));
        assert!(!CheckedIn.allows(Rejected));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for terminal in [CheckedOut, Rejected, Cancelled] {
            assert!(terminal.is_terminal());
            for to in [Pending, Approved, CheckedIn, CheckedOut, Rejected, Cancelled] {
                assert!(!terminal.allows(to), "{terminal} -> {to} should be illegal");
            }
        }
    }

    #[test]
    fn every_delta_preserves_the_total() {
        let moves = [
            (Pending, Approved),
            (Pending, Rejected),
            (Pending, Cancelled),
            (Approved, Cancelled),
            (Approved, CheckedIn),
            (CheckedIn, CheckedOut),
        ];
        for (from, to) in moves {
            let d = bed_delta(from, to);
            assert_eq!(
                d.available + d.reserved + d.occupied,
                0,
                "{from} -> {to} changes the bed total"
            );
        }
        let r = reserve_delta();
        assert_eq!(r.available + r.reserved + r.occupied, 0);
    }

    #[test]
    fn approve_leaves_counters_alone() {
        assert!(bed_delta(Pending, Approved).is_noop());
    }

    #[test]
    fn transport_moves_strictly_forward() {
        use TransportStatus::*;
        assert!(NotRequired.allows(Requested));
        assert!(Requested.allows(Arranged));
        assert!(Arranged.allows(InTransit));
        assert!(InTransit.allows(Completed));
        assert!(Requested.allows(Completed));
        assert!(!Arranged.allows(Requested));
        assert!(!Completed.allows(InTransit));
        assert!(!Requested.allows(Requested));
    }

    #[test]
    fn status_strings_roundtrip() {
        for s in [Pending, Approved, CheckedIn, CheckedOut, Rejected, Cancelled] {
            assert_eq!(s.to_string().parse::<BookingStatus>().unwrap(), s);
        }
    }
}
