//! Movement requests and the status machine they follow:
//!
//! ```text
//! pending ──approve──▶ approved ──execute──▶ executed
//!    │  ▲
//! reject resubmit
//!    ▼  │
//!  rejected
//! ```
//!
//! Transitions here are pure record edits. Persisting them, together with the ledger
//! change and the audit entry, is the job of [`crate::service::StockService`].
use super::error::{StockError, StockResult};
use super::location::LocationType;
use super::quantity::{NormalizeOptions, Quantity, RawQuantity};
use super::types::{ItemId, LocationId, MovementId, TimeStamp, UserId};
use chrono::Utc;
use std::fmt;

/// The only movement type accepted on the write path.
pub const TRANSFER: &str = "transfer";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Executed,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Pending => "pending",
            MovementStatus::Approved => "approved",
            MovementStatus::Rejected => "rejected",
            MovementStatus::Executed => "executed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "pending" => Some(MovementStatus::Pending),
            "approved" => Some(MovementStatus::Approved),
            "rejected" => Some(MovementStatus::Rejected),
            "executed" => Some(MovementStatus::Executed),
            _ => None,
        }
    }
}

impl fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a transfer reads from the warehouse's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Transfer,
    Ingress,
    Egress,
}

impl MovementKind {
    pub fn derive(from: LocationType, to: LocationType) -> Self {
        if from == LocationType::ExternalOrigin {
            return MovementKind::Ingress;
        }
        if to == LocationType::External {
            return MovementKind::Egress;
        }
        MovementKind::Transfer
    }
}

/// A transfer as proposed by a caller, before any checks.
#[derive(Debug, Clone, Default)]
pub struct ProposedMovement {
    pub item_id: String,
    pub kind: Option<String>,
    pub from_location_id: String,
    pub to_location_id: String,
    pub quantity: RawQuantity,
    pub reason: String,
}

/// Output of the shape checks; references are well formed but not yet looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedMovement {
    pub item: String,
    pub from: String,
    pub to: String,
    pub quantity: Quantity,
    pub reason: String,
}

impl ProposedMovement {
    /// Field-level validation that needs no storage access.
    pub fn check_shape(&self) -> StockResult<CheckedMovement> {
        let item = self.item_id.trim();
        if item.is_empty() {
            return Err(StockError::Validation("itemId is required".into()));
        }
        if let Some(kind) = &self.kind {
            let kind = kind.trim();
            if !kind.is_empty() && kind != TRANSFER {
                return Err(StockError::Validation(format!(
                    "unsupported movement type: {kind}"
                )));
            }
        }
        let quantity = Quantity::normalize_input(&self.quantity, NormalizeOptions::default())?;

        let from = self.from_location_id.trim();
        if from.is_empty() {
            return Err(StockError::Validation("fromLocationId is required".into()));
        }
        let to = self.to_location_id.trim();
        if to.is_empty() {
            return Err(StockError::Validation("toLocationId is required".into()));
        }
        if from == to {
            return Err(StockError::Validation(
                "source and destination must differ".into(),
            ));
        }

        Ok(CheckedMovement {
            item: item.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            quantity,
            reason: self.reason.trim().to_string(),
        })
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    #[n(0)]
    pub id: MovementId,
    #[n(1)]
    pub item: ItemId,
    #[n(2)]
    pub from: LocationId,
    #[n(3)]
    pub to: LocationId,
    #[n(4)]
    pub quantity: Quantity,
    #[n(5)]
    pub reason: String,
    #[n(6)]
    pub requested_by: UserId,
    #[n(7)]
    pub requested_at: TimeStamp<Utc>,
    #[n(8)]
    pub status: MovementStatus,
    #[n(9)]
    pub approved_by: Option<UserId>,
    #[n(10)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub executed_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub rejected_reason: Option<String>,
    // digest of the newest audit entry for this request
    #[n(13)]
    pub trail_head: Option<String>,
}

impl MovementRequest {
    pub fn new(
        item: ItemId,
        from: LocationId,
        to: LocationId,
        quantity: Quantity,
        reason: String,
        requested_by: UserId,
    ) -> Self {
        Self {
            id: MovementId::new(),
            item,
            from,
            to,
            quantity,
            reason,
            requested_by,
            requested_at: TimeStamp::new(),
            status: MovementStatus::Pending,
            approved_by: None,
            approved_at: None,
            executed_at: None,
            rejected_reason: None,
            trail_head: None,
        }
    }

    pub(crate) fn expect_status(&self, expected: MovementStatus) -> StockResult<()> {
        if self.status != expected {
            return Err(StockError::InvalidState {
                id: self.id.to_string(),
                actual: self.status,
                expected,
            });
        }
        Ok(())
    }

    pub fn approve(&mut self, approver: &UserId) -> StockResult<()> {
        self.expect_status(MovementStatus::Pending)?;
        self.status = MovementStatus::Approved;
        self.approved_by = Some(approver.clone());
        self.approved_at = Some(TimeStamp::new());
        Ok(())
    }

    pub fn reject(&mut self, approver: &UserId, reason: Option<&str>) -> StockResult<()> {
        self.expect_status(MovementStatus::Pending)?;
        self.status = MovementStatus::Rejected;
        self.rejected_reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        self.approved_by = Some(approver.clone());
        self.approved_at = Some(TimeStamp::new());
        Ok(())
    }

    /// Back to pending with a fresh request time. `reason` is kept.
    pub fn resubmit(&mut self) -> StockResult<()> {
        self.expect_status(MovementStatus::Rejected)?;
        self.status = MovementStatus::Pending;
        self.requested_at = TimeStamp::new();
        self.approved_at = None;
        self.approved_by = None;
        self.rejected_reason = None;
        Ok(())
    }

    pub fn mark_executed(&mut self, actor: &UserId) -> StockResult<()> {
        self.expect_status(MovementStatus::Approved)?;
        self.status = MovementStatus::Executed;
        if self.approved_by.is_none() {
            self.approved_by = Some(actor.clone());
        }
        if self.approved_at.is_none() {
            self.approved_at = Some(TimeStamp::new());
        }
        self.executed_at = Some(TimeStamp::new());
        Ok(())
    }

    pub fn references(&self, location: &LocationId) -> bool {
        &self.from == location || &self.to == location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn pending() -> MovementRequest {
        MovementRequest::new(
            ItemId::new(),
            LocationId::new(),
            LocationId::new(),
            Quantity::new(1, 0),
            "restock".into(),
            UserId::new(),
        )
    }

    fn proposal() -> ProposedMovement {
        ProposedMovement {
            item_id: ItemId::new().to_string(),
            kind: None,
            from_location_id: LocationId::new().to_string(),
            to_location_id: LocationId::new().to_string(),
            quantity: Quantity::new(1, 0).into(),
            reason: " restock ".into(),
        }
    }

    #[test]
    fn shape_check_trims_and_normalizes() {
        let checked = proposal().check_shape().unwrap();
        assert_eq!(checked.quantity, Quantity::new(1, 0));
        assert_eq!(checked.reason, "restock");
    }

    #[test]
    fn shape_check_rejects_same_endpoints() {
        let mut p = proposal();
        p.to_location_id = p.from_location_id.clone();
        assert_eq!(p.check_shape().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn shape_check_rejects_other_types() {
        let mut p = proposal();
        p.kind = Some("in".into());
        assert!(p.check_shape().is_err());
        p.kind = Some("transfer".into());
        assert!(p.check_shape().is_ok());
    }

    #[test]
    fn shape_check_rejects_zero_quantity() {
        let mut p = proposal();
        p.quantity = RawQuantity::Missing;
        assert_eq!(p.check_shape().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn approve_then_execute() {
        let mut request = pending();
        let approver = UserId::new();
        request.approve(&approver).unwrap();
        request.mark_executed(&approver).unwrap();

        assert_eq!(request.status, MovementStatus::Executed);
        assert_eq!(request.approved_by, Some(approver));
        assert!(request.executed_at.is_some());
    }

    #[test]
    fn only_pending_can_be_decided() {
        let mut request = pending();
        request.reject(&UserId::new(), Some("duplicate")).unwrap();

        let err = request.approve(&UserId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = request.reject(&UserId::new(), Some("again")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(request.rejected_reason.as_deref(), Some("duplicate"));
    }

    #[test]
    fn resubmit_clears_decision() {
        let mut request = pending();
        let first_requested = request.requested_at.clone();
        request.reject(&UserId::new(), Some("duplicate")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        request.resubmit().unwrap();

        assert_eq!(request.status, MovementStatus::Pending);
        assert_eq!(request.approved_by, None);
        assert_eq!(request.approved_at, None);
        assert_eq!(request.rejected_reason, None);
        assert_eq!(request.reason, "restock");
        assert!(request.requested_at > first_requested);
    }

    #[test]
    fn resubmit_requires_rejected() {
        let mut request = pending();
        assert_eq!(request.resubmit().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn execute_requires_approval() {
        let mut request = pending();
        assert!(request.mark_executed(&UserId::new()).is_err());
    }

    #[test]
    fn kind_follows_location_types() {
        use LocationType::*;
        assert_eq!(MovementKind::derive(ExternalOrigin, Warehouse), MovementKind::Ingress);
        assert_eq!(MovementKind::derive(Warehouse, External), MovementKind::Egress);
        assert_eq!(MovementKind::derive(Warehouse, Warehouse), MovementKind::Transfer);
    }
}
