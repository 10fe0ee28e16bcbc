//! Smoke Screen Unit tests for stock tracking components
//!
//! These tests span the public surface of the crate and exercise each building block
//! in isolation from the workflow scenarios. They mostly cover the happy path.

use chrono::{Datelike, Timelike, Utc};
use stockflow::{
    ErrorKind, StockError,
    audit::{DateRange, Metadata, MovementLog, verify_chain},
    movement::MovementStatus,
    quantity::Quantity,
    types::{ItemId, LocationId, MovementId, TimeStamp, UserId},
    utils::{bech32_payload, new_uuid_to_bech32},
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// new_uuid_to_bech32 yields a bech32 string under the given prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("item").unwrap();
        assert!(encoded.starts_with("item1"));
        assert!(bech32_payload(&encoded, "item").is_some());
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn payload_checks_prefix() {
        let encoded = new_uuid_to_bech32("loc").unwrap();
        assert!(bech32_payload(&encoded, "item").is_none());
        assert!(bech32_payload("loc1garbage", "loc").is_none());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("mvt").unwrap();
        let id2 = new_uuid_to_bech32("mvt").unwrap();
        assert_ne!(id1, id2);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn ids_parse_only_their_own_prefix() {
        let item = ItemId::new();
        assert_eq!(ItemId::parse(item.as_str()), Some(item.clone()));
        assert_eq!(LocationId::parse(item.as_str()), None);
        assert_eq!(MovementId::parse(""), None);
    }

    #[test]
    fn timestamp_new_creates_current_time() {
        let before = Utc::now();
        let ts = TimeStamp::<Utc>::new();
        assert!(ts.to_datetime_utc() >= before);
    }

    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let ts = TimeStamp::<Utc>::new_with(2024, 3, 15, 14, 30, 45).unwrap();
        let dt = ts.to_datetime_utc();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);
        assert_eq!(dt.second(), 45);
    }

    #[test]
    fn timestamp_rejects_impossible_dates() {
        assert!(TimeStamp::<Utc>::new_with(2024, 2, 30, 0, 0, 0).is_none());
    }
}

// MOVEMENT MODULE TESTS
#[cfg(test)]
mod movement_tests {
    use super::*;

    #[test]
    fn status_names_parse_back() {
        for status in [
            MovementStatus::Pending,
            MovementStatus::Approved,
            MovementStatus::Rejected,
            MovementStatus::Executed,
        ] {
            assert_eq!(MovementStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MovementStatus::parse(" rejected "), Some(MovementStatus::Rejected));
        assert_eq!(MovementStatus::parse("Pending"), None);
        assert_eq!(MovementStatus::parse(""), None);
    }
}

// ERROR MODULE TESTS
#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn every_error_has_a_stable_code() {
        let cases = [
            (StockError::Validation("x".into()), "VALIDATION_ERROR"),
            (StockError::LocationNotFound("l".into()), "LOCATION_NOT_FOUND"),
            (StockError::LocationInactive("l".into()), "LOCATION_INACTIVE"),
            (StockError::LocationTypeInvalid("l".into()), "LOCATION_TYPE_INVALID"),
            (StockError::ItemNotFound("i".into()), "ITEM_NOT_FOUND"),
            (
                StockError::NotFound {
                    entity: "movement",
                    id: "m".into(),
                },
                "NOT_FOUND",
            ),
            (
                StockError::InvalidState {
                    id: "m".into(),
                    actual: MovementStatus::Executed,
                    expected: MovementStatus::Pending,
                },
                "INVALID_STATE",
            ),
            (StockError::Conflict("c".into()), "CONFLICT"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn insufficient_stock_message_names_both_amounts() {
        let err = StockError::InsufficientStock {
            location: "loc1".into(),
            available: Quantity::new(2, 0),
            requested: Quantity::new(5, 0),
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(
            err.to_string(),
            "insufficient stock at loc1: have 2 boxes / 0 units, need 5 boxes / 0 units"
        );
    }
}

// AUDIT MODULE TESTS
#[cfg(test)]
mod audit_tests {
    use super::*;

    #[test]
    fn metadata_drops_absent_values() {
        let metadata: Metadata = [("ip", Some("127.0.0.1")), ("userAgent", None)]
            .into_iter()
            .collect();
        assert_eq!(metadata.get("ip"), Some("127.0.0.1"));
        assert_eq!(metadata.get("userAgent"), None);
    }

    #[test]
    fn chain_detects_tampering() {
        let movement = MovementId::new();
        let first = MovementLog::new(movement.clone(), "requested", UserId::new(), Metadata::new(), None)
            .unwrap();
        let second = MovementLog::new(
            movement,
            "approved",
            UserId::new(),
            Metadata::new(),
            Some(first.digest().unwrap()),
        )
        .unwrap();
        let head = second.digest().unwrap();
        assert!(verify_chain(&[first.clone(), second.clone()], Some(head.as_str())).unwrap());

        let mut forged = first;
        forged.action = "rejected".into();
        assert!(!verify_chain(&[forged, second], Some(head.as_str())).unwrap());
    }

    #[test]
    fn date_range_covers_whole_days() {
        let range = DateRange::from_days(Some("2024-05-01"), Some("2024-05-01"));
        let morning = TimeStamp::<Utc>::new_with(2024, 5, 1, 0, 0, 0).unwrap();
        let night = TimeStamp::<Utc>::new_with(2024, 5, 1, 23, 59, 59).unwrap();
        let next = TimeStamp::<Utc>::new_with(2024, 5, 2, 0, 0, 0).unwrap();
        assert!(range.contains(&morning.to_datetime_utc()));
        assert!(range.contains(&night.to_datetime_utc()));
        assert!(!range.contains(&next.to_datetime_utc()));
    }
}
