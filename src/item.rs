//! Catalog items and the per-location stock ledger they carry.
use super::error::{StockError, StockResult};
use super::quantity::{Quantity, QuantityDelta};
use super::types::{GroupId, ItemId, LocationId, TimeStamp};
use chrono::Utc;
use std::collections::BTreeMap;

/// Location → balance. Zero balances are never stored: an entry that reaches zero is
/// removed, and a missing entry reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockLedger {
    entries: BTreeMap<LocationId, Quantity>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (LocationId, Quantity)>,
    {
        let mut ledger = Self::new();
        for (location, quantity) in entries {
            ledger.overwrite(location, quantity);
        }
        ledger
    }

    pub fn read_quantity(&self, location: &LocationId) -> Quantity {
        self.entries.get(location).copied().unwrap_or_default()
    }

    /// The single sanctioned transactional mutation. On error the ledger is untouched.
    pub fn adjust(&mut self, location: &LocationId, delta: QuantityDelta) -> StockResult<Quantity> {
        let current = self.read_quantity(location);
        let updated = current
            .combine(delta)
            .map_err(|e| e.at(location.as_str()))?;
        self.overwrite(location.clone(), updated);
        Ok(updated)
    }

    /// Administrative overwrite; still prunes zero.
    pub fn overwrite(&mut self, location: LocationId, quantity: Quantity) {
        if quantity.is_zero() {
            self.entries.remove(&location);
        } else {
            self.entries.insert(location, quantity);
        }
    }

    pub fn holds(&self, location: &LocationId) -> bool {
        self.entries.contains_key(location)
    }

    pub fn total(&self) -> Quantity {
        self.entries
            .values()
            .fold(Quantity::ZERO, |acc, quantity| acc + *quantity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationId, &Quantity)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> minicbor::Encode<C> for StockLedger {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.encode_with(&self.entries, ctx)?.ok()
    }
}

// stored records may carry explicit zero entries, so loading goes through the pruning path
impl<'b, C> minicbor::Decode<'b, C> for StockLedger {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        let entries: BTreeMap<LocationId, Quantity> = d.decode_with(ctx)?;
        Ok(Self::from_entries(entries))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    #[n(0)]
    pub id: ItemId,
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub group: Option<GroupId>,
    #[n(4)]
    pub attributes: BTreeMap<String, String>,
    #[n(5)]
    pub stock: StockLedger,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub updated_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub code: String,
    pub description: String,
    pub group: Option<GroupId>,
    pub attributes: BTreeMap<String, String>,
}

impl Item {
    pub fn from_input(input: NewItem) -> StockResult<Self> {
        let code = input.code.trim();
        if code.is_empty() {
            return Err(StockError::Validation("item code is required".into()));
        }
        let description = input.description.trim();
        if description.is_empty() {
            return Err(StockError::Validation("item description is required".into()));
        }
        let now = TimeStamp::new();

        Ok(Self {
            id: ItemId::new(),
            code: code.to_string(),
            description: description.to_string(),
            group: input.group,
            attributes: input.attributes,
            stock: StockLedger::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_entries_read_as_zero() {
        let ledger = StockLedger::new();
        assert_eq!(ledger.read_quantity(&LocationId::new()), Quantity::ZERO);
    }

    #[test]
    fn adjust_prunes_entries_reaching_zero() {
        let warehouse = LocationId::new();
        let mut ledger = StockLedger::from_entries([(warehouse.clone(), Quantity::new(2, 3))]);

        ledger
            .adjust(&warehouse, Quantity::new(2, 3).negate())
            .unwrap();

        assert!(!ledger.holds(&warehouse));
        assert!(ledger.is_empty());
    }

    #[test]
    fn failed_adjust_leaves_ledger_untouched() {
        let warehouse = LocationId::new();
        let mut ledger = StockLedger::from_entries([(warehouse.clone(), Quantity::new(2, 0))]);
        let before = ledger.clone();

        let err = ledger
            .adjust(&warehouse, Quantity::new(5, 0).negate())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(ledger, before);
    }

    #[test]
    fn overwrite_with_zero_removes() {
        let warehouse = LocationId::new();
        let mut ledger = StockLedger::from_entries([
            (warehouse.clone(), Quantity::new(1, 0)),
            (LocationId::new(), Quantity::ZERO),
        ]);
        assert_eq!(ledger.len(), 1);

        ledger.overwrite(warehouse, Quantity::ZERO);
        assert!(ledger.is_empty());
    }

    #[test]
    fn decoding_drops_zero_entries() {
        let warehouse = LocationId::new();
        let raw = BTreeMap::from([
            (warehouse.clone(), Quantity::new(0, 3)),
            (LocationId::new(), Quantity::ZERO),
        ]);
        let bytes = minicbor::to_vec(&raw).unwrap();

        let ledger: StockLedger = minicbor::decode(&bytes).unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.read_quantity(&warehouse), Quantity::new(0, 3));
        let again: StockLedger = minicbor::decode(&minicbor::to_vec(&ledger).unwrap()).unwrap();
        assert_eq!(again, ledger);
    }

    #[test]
    fn total_sums_all_locations() {
        let ledger = StockLedger::from_entries([
            (LocationId::new(), Quantity::new(1, 4)),
            (LocationId::new(), Quantity::new(2, 1)),
        ]);
        assert_eq!(ledger.total(), Quantity::new(3, 5));
    }

    #[test]
    fn item_needs_code_and_description() {
        let err = Item::from_input(NewItem {
            code: " ".into(),
            description: "Shirt".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
