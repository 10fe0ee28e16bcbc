//! Stock locations: warehouses that hold stock and external parties stock moves to or from.
use super::error::{StockError, StockResult};
use super::types::{LocationId, TimeStamp};
use chrono::Utc;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocationType {
    #[default]
    #[n(0)]
    Warehouse,
    #[n(1)]
    External,
    #[n(2)]
    ExternalOrigin,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocationStatus {
    #[default]
    #[n(0)]
    Active,
    #[n(1)]
    Inactive,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Location {
    #[n(0)]
    pub id: LocationId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub kind: LocationType,
    #[n(3)]
    pub status: LocationStatus,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub contact_info: String,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub updated_at: TimeStamp<Utc>,
}

/// Input for creating a location; blank optional strings are stored empty.
#[derive(Debug, Clone, Default)]
pub struct NewLocation {
    pub name: String,
    pub kind: LocationType,
    pub status: LocationStatus,
    pub description: String,
    pub contact_info: String,
}

/// Partial edit; `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct LocationPatch {
    pub name: Option<String>,
    pub kind: Option<LocationType>,
    pub status: Option<LocationStatus>,
    pub description: Option<String>,
    pub contact_info: Option<String>,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Warehouse => "warehouse",
            LocationType::External => "external",
            LocationType::ExternalOrigin => "externalOrigin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "warehouse" => Some(LocationType::Warehouse),
            "external" => Some(LocationType::External),
            "externalOrigin" => Some(LocationType::ExternalOrigin),
            _ => None,
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Location {
    pub fn from_input(input: NewLocation) -> StockResult<Self> {
        let name = required_name(&input.name)?;
        let now = TimeStamp::new();

        Ok(Self {
            id: LocationId::new(),
            name,
            kind: input.kind,
            status: input.status,
            description: input.description.trim().to_string(),
            contact_info: input.contact_info.trim().to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn apply(&mut self, patch: LocationPatch) -> StockResult<()> {
        if let Some(name) = patch.name {
            self.name = required_name(&name)?;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(contact_info) = patch.contact_info {
            self.contact_info = contact_info.trim().to_string();
        }
        self.updated_at = TimeStamp::new();
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == LocationStatus::Active
    }

    /// Preconditions for taking part in a new movement.
    pub fn ensure_usable(&self, require_warehouse: bool) -> StockResult<()> {
        if !self.is_active() {
            return Err(StockError::LocationInactive(self.id.to_string()));
        }
        if require_warehouse && self.kind != LocationType::Warehouse {
            return Err(StockError::LocationTypeInvalid(self.id.to_string()));
        }
        Ok(())
    }
}

fn required_name(name: &str) -> StockResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StockError::Validation("location name is required".into()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn location(kind: LocationType, status: LocationStatus) -> Location {
        Location::from_input(NewLocation {
            name: "Central".into(),
            kind,
            status,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn inactive_locations_are_unusable() {
        let loc = location(LocationType::Warehouse, LocationStatus::Inactive);
        assert_eq!(
            loc.ensure_usable(false).unwrap_err().kind(),
            ErrorKind::LocationInactive
        );
    }

    #[test]
    fn sources_must_be_warehouses() {
        let loc = location(LocationType::External, LocationStatus::Active);
        assert!(loc.ensure_usable(false).is_ok());
        assert_eq!(
            loc.ensure_usable(true).unwrap_err().kind(),
            ErrorKind::LocationTypeInvalid
        );
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = Location::from_input(NewLocation {
            name: "   ".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn type_names_round_trip() {
        for kind in [
            LocationType::Warehouse,
            LocationType::External,
            LocationType::ExternalOrigin,
        ] {
            assert_eq!(LocationType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LocationType::parse("dock"), None);
    }
}
