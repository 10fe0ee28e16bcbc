//! Reference data the movement workflow reads: locations, groups and items.
use super::error::{StockError, StockResult};
use super::group::{Group, GroupTree, build_filter_values};
use super::item::{Item, NewItem};
use super::location::{Location, LocationPatch, LocationStatus, LocationType, NewLocation};
use super::quantity::{NormalizeOptions, Quantity, RawQuantity};
use super::store::{self, Store, abort, tx_count, tx_get, tx_put, tx_shift};
use super::types::{GroupId, ItemId, LocationId};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

pub struct Catalog {
    store: Store,
}

impl Catalog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    // ---- locations ----

    pub fn create_location(&self, input: NewLocation) -> StockResult<Location> {
        let location = Location::from_input(input)?;
        store::put(&self.store.locations, location.id.as_str(), &location)?;
        info!(location = %location.id, kind = %location.kind, "location created");
        Ok(location)
    }

    pub fn get_location(&self, id: &str) -> StockResult<Location> {
        store::get(&self.store.locations, id.trim())?.ok_or_else(|| StockError::NotFound {
            entity: "location",
            id: id.to_string(),
        })
    }

    pub fn update_location(&self, id: &str, patch: LocationPatch) -> StockResult<Location> {
        let mut location = self.get_location(id)?;
        location.apply(patch)?;
        store::put(&self.store.locations, location.id.as_str(), &location)?;
        info!(location = %location.id, status = ?location.status, "location updated");
        Ok(location)
    }

    /// Sorted by name.
    pub fn list_locations(
        &self,
        kind: Option<LocationType>,
        status: Option<LocationStatus>,
    ) -> StockResult<Vec<Location>> {
        let mut locations: Vec<Location> = store::scan_all(&self.store.locations)?;
        locations.retain(|l| kind.is_none_or(|k| l.kind == k) && status.is_none_or(|s| l.status == s));
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    /// Resolve a location reference for a new movement: it must be well formed, exist,
    /// be active and, for sources, be a warehouse.
    pub fn must_exist(&self, id: &str, require_warehouse: bool) -> StockResult<Location> {
        let parsed = LocationId::parse(id)
            .ok_or_else(|| StockError::LocationNotFound(id.to_string()))?;
        let location: Location = store::get(&self.store.locations, parsed.as_str())?
            .ok_or_else(|| StockError::LocationNotFound(id.to_string()))?;
        location.ensure_usable(require_warehouse)?;
        Ok(location)
    }

    /// True while any movement request points at the location or any item holds stock there.
    pub fn is_location_referenced(&self, id: &LocationId) -> StockResult<bool> {
        Ok(store::count(&self.store.location_refs, id.as_str())? > 0)
    }

    /// Removes an unreferenced location. Runs against the reference counter in the same
    /// transaction as the removal, so a concurrent proposal or stock write either commits
    /// first and blocks the delete, or sees the location gone.
    pub fn delete_location(&self, id: &str) -> StockResult<()> {
        let key = id.trim();
        let location = (&self.store.locations, &self.store.location_refs).transaction(
            |(locations, refs)| -> ConflictableTransactionResult<Location, StockError> {
                let Some(location) = tx_get::<Location>(locations, key)? else {
                    return abort(Err(StockError::NotFound {
                        entity: "location",
                        id: id.to_string(),
                    }));
                };
                if tx_count(refs, location.id.as_str())? > 0 {
                    return abort(Err(StockError::Conflict(format!(
                        "location {} still has movements or stock",
                        location.id
                    ))));
                }
                locations.remove(location.id.as_str().as_bytes())?;
                Ok(location)
            },
        )?;
        info!(location = %location.id, "location deleted");
        Ok(())
    }

    // ---- groups ----

    pub fn create_group(&self, name: &str, parent: Option<&GroupId>) -> StockResult<Group> {
        let group = Group::new(name, parent.cloned());
        if group.name.is_empty() {
            return Err(StockError::Validation("group name is required".into()));
        }

        (&self.store.groups, &self.store.group_names).transaction(
            |(groups, names)| -> ConflictableTransactionResult<(), StockError> {
                if names.get(group.name.as_bytes())?.is_some() {
                    return abort(Err(StockError::Conflict(format!(
                        "group name {} already exists",
                        group.name
                    ))));
                }
                if let Some(parent) = &group.parent {
                    if groups.get(parent.as_str().as_bytes())?.is_none() {
                        return abort(Err(StockError::NotFound {
                            entity: "group",
                            id: parent.to_string(),
                        }));
                    }
                }
                tx_put(groups, group.id.as_str().as_bytes(), &group)?;
                names.insert(group.name.as_bytes(), group.id.as_str().as_bytes())?;
                Ok(())
            },
        )?;

        info!(group = %group.id, name = %group.name, "group created");
        Ok(group)
    }

    pub fn get_group(&self, id: &str) -> StockResult<Group> {
        store::get(&self.store.groups, id.trim())?.ok_or_else(|| group_not_found(id))
    }

    /// Re-parent a group. Refuses to create a loop. The ancestor walk reads every link
    /// inside the transaction, so two crossing re-parents cannot both commit.
    pub fn set_parent(&self, id: &str, parent: Option<&GroupId>) -> StockResult<Group> {
        let key = id.trim();
        let group = self.store.groups.transaction(
            |groups| -> ConflictableTransactionResult<Group, StockError> {
                let Some(mut group) = tx_get::<Group>(groups, key)? else {
                    return abort(Err(group_not_found(id)));
                };
                let mut cursor = parent.cloned();
                let mut seen = HashSet::new();
                while let Some(ancestor) = cursor {
                    if ancestor == group.id {
                        return abort(Err(StockError::Validation(format!(
                            "group {} cannot be nested under its own descendant",
                            group.id
                        ))));
                    }
                    if !seen.insert(ancestor.clone()) {
                        break;
                    }
                    let Some(link) = tx_get::<Group>(groups, ancestor.as_str())? else {
                        return abort(Err(group_not_found(ancestor.as_str())));
                    };
                    cursor = link.parent;
                }
                group.parent = parent.cloned();
                tx_put(groups, group.id.as_str().as_bytes(), &group)?;
                Ok(group)
            },
        )?;
        info!(group = %group.id, parent = ?group.parent, "group moved");
        Ok(group)
    }

    pub fn group_tree(&self) -> StockResult<GroupTree> {
        let groups: Vec<Group> = store::scan_all(&self.store.groups)?;
        Ok(GroupTree::from_links(groups.into_iter().map(|g| (g.id, g.parent))))
    }

    /// The group plus every transitive child; empty for malformed or unknown ids.
    pub fn descendants_and_self(&self, id: &str) -> StockResult<BTreeSet<GroupId>> {
        let Some(root) = GroupId::parse(id) else {
            return Ok(BTreeSet::new());
        };
        let resolved = self.group_tree()?.descendants_and_self(&root);
        debug!(group = %root, count = resolved.len(), "resolved group closure");
        Ok(resolved)
    }

    // ---- items ----

    pub fn create_item(&self, input: NewItem) -> StockResult<Item> {
        if let Some(group) = &input.group {
            self.get_group(group.as_str())?;
        }
        let item = Item::from_input(input)?;

        (&self.store.items, &self.store.item_codes).transaction(
            |(items, codes)| -> ConflictableTransactionResult<(), StockError> {
                if codes.get(item.code.as_bytes())?.is_some() {
                    return abort(Err(StockError::Conflict(format!(
                        "item code {} already exists",
                        item.code
                    ))));
                }
                tx_put(items, item.id.as_str().as_bytes(), &item)?;
                codes.insert(item.code.as_bytes(), item.id.as_str().as_bytes())?;
                Ok(())
            },
        )?;

        info!(item = %item.id, code = %item.code, "item created");
        Ok(item)
    }

    pub fn get_item(&self, id: &str) -> StockResult<Item> {
        let parsed = ItemId::parse(id).ok_or_else(|| StockError::ItemNotFound(id.to_string()))?;
        store::get(&self.store.items, parsed.as_str())?
            .ok_or_else(|| StockError::ItemNotFound(id.to_string()))
    }

    pub fn find_item_by_code(&self, code: &str) -> StockResult<Option<Item>> {
        match self.store.item_codes.get(code.trim().as_bytes())? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id).into_owned();
                store::get(&self.store.items, &id)
            }
            None => Ok(None),
        }
    }

    /// Administrative stock overwrite, outside the movement workflow. A zero amount
    /// removes the entry.
    pub fn set_stock(&self, item_id: &str, location_id: &str, amount: &RawQuantity) -> StockResult<Item> {
        let location_key = location_id.trim();
        let quantity = Quantity::normalize_input(
            amount,
            NormalizeOptions {
                allow_zero: true,
                field: "stock",
            },
        )?;
        let item_id = self.get_item(item_id)?.id;

        let item = (&self.store.items, &self.store.locations, &self.store.location_refs)
            .transaction(|(items, locations, refs)| -> ConflictableTransactionResult<Item, StockError> {
                let Some(location) = tx_get::<Location>(locations, location_key)? else {
                    return abort(Err(StockError::NotFound {
                        entity: "location",
                        id: location_id.to_string(),
                    }));
                };
                let Some(mut item) = tx_get::<Item>(items, item_id.as_str())? else {
                    return Err(ConflictableTransactionError::Abort(StockError::ItemNotFound(
                        item_id.to_string(),
                    )));
                };
                let held = item.stock.holds(&location.id);
                item.stock.overwrite(location.id.clone(), quantity);
                track_holding(refs, &location.id, held, item.stock.holds(&location.id))?;
                item.touch();
                tx_put(items, item.id.as_str().as_bytes(), &item)?;
                Ok(item)
            })?;

        info!(item = %item.id, location = location_key, %quantity, "stock overwritten");
        Ok(item)
    }

    pub fn list_items(&self) -> StockResult<Vec<Item>> {
        store::scan_all(&self.store.items)
    }

    /// Items whose group is the given group or any group nested under it.
    pub fn items_in_group(&self, group_id: &str) -> StockResult<Vec<Item>> {
        let groups = self.descendants_and_self(group_id)?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        // sorted, since the set iterates in id order
        let keys = build_filter_values(&groups);
        let mut items = self.list_items()?;
        items.retain(|item| {
            item.group
                .as_ref()
                .is_some_and(|g| keys.binary_search_by(|k| k.as_str().cmp(g.as_str())).is_ok())
        });
        Ok(items)
    }
}

fn group_not_found(id: &str) -> StockError {
    StockError::NotFound {
        entity: "group",
        id: id.to_string(),
    }
}

/// Keep a location's reference count in step with a ledger entry appearing or vanishing.
pub(crate) fn track_holding(
    refs: &TransactionalTree,
    location: &LocationId,
    before: bool,
    after: bool,
) -> ConflictableTransactionResult<(), StockError> {
    match (before, after) {
        (false, true) => tx_shift(refs, location.as_str(), 1).map(drop),
        (true, false) => tx_shift(refs, location.as_str(), -1).map(drop),
        _ => Ok(()),
    }
}
