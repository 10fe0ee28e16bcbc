//! Identifier newtypes and the CBOR-encodable timestamp shared by every record.
use super::utils;
use chrono::{DateTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $hrp:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $hrp;

            /// Mint a fresh, time-ordered identifier.
            pub fn new() -> Self {
                Self(mint($hrp))
            }

            /// Accepts only strings minted under this entity's prefix.
            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                utils::bech32_payload(raw, $hrp).map(|_| Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The uuid7 bytes behind the identifier; these sort in mint order.
            pub fn payload(&self) -> Option<[u8; 16]> {
                utils::bech32_payload(&self.0, $hrp)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.str(&self.0)?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                Ok(Self(d.str()?.to_owned()))
            }
        }
    };
}

entity_id!(ItemId, "item");
entity_id!(LocationId, "loc");
entity_id!(GroupId, "grp");
entity_id!(MovementId, "mvt");
entity_id!(
    /// Opaque reference to the authenticated actor, issued by the auth layer.
    UserId,
    "user"
);
entity_id!(LogId, "log");

// the prefixes are static and valid, and a 16 byte payload always fits
fn mint(hrp: &str) -> String {
    utils::new_uuid_to_bech32(hrp).expect("static id prefix failed to encode")
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// derived ordering would demand `Utc: Ord`
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for TimeStamp<Utc> {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_chronologically() {
        let early = TimeStamp::new_with(2024, 1, 1, 8, 0, 0).unwrap();
        let late = TimeStamp::new_with(2024, 1, 1, 9, 0, 0).unwrap();
        assert!(early < late);
        assert!(late >= early.clone());

        let mut stamps = vec![late.clone(), early.clone(), late.clone()];
        stamps.sort_by(|a, b| b.cmp(a));
        assert_eq!(stamps, vec![late.clone(), late, early]);
    }

    #[test]
    fn ids_carry_their_prefix() {
        let item = ItemId::new();
        assert!(item.as_str().starts_with("item1"));
        assert!(ItemId::parse(item.as_str()).is_some());
        assert!(LocationId::parse(item.as_str()).is_none());
        assert!(LocationId::parse("not-an-id").is_none());
    }

    #[test]
    fn payloads_sort_in_mint_order() {
        let first = LogId::new();
        let second = LogId::new();
        assert!(first.payload().unwrap() < second.payload().unwrap());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(MovementId::new(), MovementId::new());
    }
}
