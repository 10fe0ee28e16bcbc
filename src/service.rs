//! Service layer API for the movement workflow.
//!
//! Every state change runs as one sled transaction over the item, movement and log
//! trees. sled transactions are optimistic: if another commit touches what a body read,
//! the body re-runs against fresh data. That gives the two guarantees the workflow
//! relies on:
//!
//! * two deciders racing on one pending request serialize, and the loser re-reads a
//!   non-pending request and fails with `InvalidState`;
//! * ledger read-modify-write cannot lose an update, so concurrent debits against one
//!   location are checked against the committed balance;
//! * a proposal re-reads its locations and bumps their reference counts in the same
//!   commit, so it cannot race a location delete.
//!
//! Transaction bodies may run more than once, so they only compute and write; events
//! are logged after commit.
use super::audit::{self, LogFilter, Metadata, MovementLog, actions};
use super::catalog::{Catalog, track_holding};
use super::config::StoreConfig;
use super::error::{StockError, StockResult};
use super::item::Item;
use super::location::Location;
use super::movement::{MovementKind, MovementRequest, MovementStatus, ProposedMovement};
use super::quantity::Quantity;
use super::store::{self, Store, abort, tx_get, tx_put, tx_shift};
use super::types::{GroupId, ItemId, LocationId, MovementId, UserId};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A proposal that passed every check and can be persisted.
#[derive(Debug, Clone)]
pub struct ValidatedMovement {
    pub item: ItemId,
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub source: Location,
    pub destination: Location,
    pub reason: String,
}

pub struct StockService {
    store: Store,
    catalog: Catalog,
    log_page_limit: usize,
}

impl StockService {
    pub fn new(store: Store) -> Self {
        Self::with_config(store, &StoreConfig::default())
    }

    pub fn with_config(store: Store, config: &StoreConfig) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            store,
            log_page_limit: config.log_page_limit,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Check a proposal against the quantity rules and the location registry.
    /// Nothing is written.
    pub fn validate(&self, proposal: &ProposedMovement) -> StockResult<ValidatedMovement> {
        let checked = proposal.check_shape()?;
        let source = self.catalog.must_exist(&checked.from, true)?;
        let destination = self.catalog.must_exist(&checked.to, false)?;
        let item = self.catalog.get_item(&checked.item)?;

        Ok(ValidatedMovement {
            item: item.id,
            kind: MovementKind::derive(source.kind, destination.kind),
            quantity: checked.quantity,
            source,
            destination,
            reason: checked.reason,
        })
    }

    /// Validate and store a new pending request, logging `requested`.
    pub fn propose(
        &self,
        proposal: &ProposedMovement,
        requested_by: &UserId,
        metadata: Metadata,
    ) -> StockResult<MovementRequest> {
        let valid = self.validate(proposal).inspect_err(|e| {
            debug!(code = e.code(), error = %e, "movement proposal refused");
        })?;
        let kind = valid.kind;
        let created = MovementRequest::new(
            valid.item,
            valid.source.id,
            valid.destination.id,
            valid.quantity,
            valid.reason,
            requested_by.clone(),
        );

        // validate() ran outside the transaction; re-read the locations it checked
        let request = (
            &self.store.movements,
            &self.store.movement_logs,
            &self.store.locations,
            &self.store.location_refs,
        )
            .transaction(
                |(movements, logs, locations, refs)| -> ConflictableTransactionResult<MovementRequest, StockError> {
                    recheck_location(locations, &created.from, true)?;
                    recheck_location(locations, &created.to, false)?;
                    let mut request = created.clone();
                    append_in(logs, &mut request, actions::REQUESTED, requested_by, &metadata)?;
                    tx_put(movements, request.id.as_str().as_bytes(), &request)?;
                    tx_shift(refs, request.from.as_str(), 1)?;
                    tx_shift(refs, request.to.as_str(), 1)?;
                    Ok(request)
                },
            )?;

        info!(
            movement_id = %request.id,
            item_id = %request.item,
            from = %request.from,
            to = %request.to,
            quantity = %request.quantity,
            ?kind,
            actor = %requested_by,
            "movement requested"
        );
        Ok(request)
    }

    /// Approve a pending request and move the stock in the same transaction. If the
    /// ledger step fails nothing is kept: the request stays pending with no new log.
    pub fn approve(
        &self,
        id: &str,
        approver: &UserId,
        metadata: Metadata,
    ) -> StockResult<MovementRequest> {
        let (request, _) = self
            .transition(id, |items, logs, refs, request| {
                abort(request.approve(approver))?;
                append_in(logs, request, actions::APPROVED, approver, &metadata)?;
                execute_in(items, logs, refs, request, approver, &metadata)
            })
            .inspect_err(|e| warn!(movement_id = id, code = e.code(), error = %e, "approval failed"))?;

        info!(
            movement_id = %request.id,
            item_id = %request.item,
            quantity = %request.quantity,
            actor = %approver,
            status = %request.status,
            "movement approved and executed"
        );
        Ok(request)
    }

    pub fn reject(
        &self,
        id: &str,
        approver: &UserId,
        reason: Option<&str>,
        metadata: Metadata,
    ) -> StockResult<MovementRequest> {
        let (request, _) = self
            .transition(id, |_, logs, _, request| {
                abort(request.reject(approver, reason))?;
                append_in(logs, request, actions::REJECTED, approver, &metadata)
            })
            .inspect_err(|e| warn!(movement_id = id, code = e.code(), error = %e, "rejection failed"))?;

        info!(
            movement_id = %request.id,
            actor = %approver,
            reason = request.rejected_reason.as_deref().unwrap_or(""),
            "movement rejected"
        );
        Ok(request)
    }

    pub fn resubmit(
        &self,
        id: &str,
        actor: &UserId,
        metadata: Metadata,
    ) -> StockResult<MovementRequest> {
        let (request, _) = self
            .transition(id, |_, logs, _, request| {
                abort(request.resubmit())?;
                append_in(logs, request, actions::RESUBMITTED, actor, &metadata)
            })
            .inspect_err(|e| warn!(movement_id = id, code = e.code(), error = %e, "resubmission failed"))?;

        info!(movement_id = %request.id, actor = %actor, "movement resubmitted");
        Ok(request)
    }

    /// Move the stock for a request left in `approved`. Approval already executes, so
    /// this only finds work on records written by an interrupted or older writer.
    /// Running it twice is safe: the second call sees `executed` and fails.
    pub fn execute(
        &self,
        id: &str,
        actor: &UserId,
        metadata: Metadata,
    ) -> StockResult<MovementRequest> {
        let (request, _) = self
            .transition(id, |items, logs, refs, request| {
                abort(request.expect_status(MovementStatus::Approved))?;
                execute_in(items, logs, refs, request, actor, &metadata)
            })
            .inspect_err(|e| warn!(movement_id = id, code = e.code(), error = %e, "execution failed"))?;

        info!(movement_id = %request.id, actor = %actor, "movement executed");
        Ok(request)
    }

    /// Finish every request found in `approved`. Failures are logged and skipped so one
    /// bad record does not block the rest.
    pub fn recover_approved(&self, actor: &UserId) -> StockResult<Vec<MovementRequest>> {
        let stalled = self.list_movements(Some(MovementStatus::Approved))?;
        let mut recovered = Vec::with_capacity(stalled.len());
        for request in stalled {
            let metadata = Metadata::new().with("recovery", Some(true));
            match self.execute(request.id.as_str(), actor, metadata) {
                Ok(done) => recovered.push(done),
                Err(e) => warn!(movement_id = %request.id, code = e.code(), "left in approved"),
            }
        }
        Ok(recovered)
    }

    /// Administrative hard delete of a request and its trail. The ledger is not touched;
    /// the request's hold on its two locations is released.
    pub fn delete_movement(&self, id: &str) -> StockResult<()> {
        let request = self.get_movement(id)?;
        let prefix = audit::trail_prefix(&request.id);
        let log_keys = self
            .store
            .movement_logs
            .scan_prefix(&prefix)
            .keys()
            .collect::<Result<Vec<_>, _>>()?;

        let removal = |(movements, logs, refs): &(TransactionalTree, TransactionalTree, TransactionalTree)| {
            if movements.get(request.id.as_str().as_bytes())?.is_none() {
                return abort(Err(not_found(id)));
            }
            for key in &log_keys {
                logs.remove(key.clone())?;
            }
            movements.remove(request.id.as_str().as_bytes())?;
            tx_shift(refs, request.from.as_str(), -1)?;
            tx_shift(refs, request.to.as_str(), -1)?;
            Ok(())
        };
        (&self.store.movements, &self.store.movement_logs, &self.store.location_refs)
            .transaction(removal)?;

        // entries appended between the scan and the commit
        for key in self.store.movement_logs.scan_prefix(&prefix).keys() {
            self.store.movement_logs.remove(key?)?;
        }

        info!(movement_id = %request.id, logs = log_keys.len(), "movement deleted");
        Ok(())
    }

    pub fn get_movement(&self, id: &str) -> StockResult<MovementRequest> {
        let parsed = MovementId::parse(id).ok_or_else(|| not_found(id))?;
        store::get(&self.store.movements, parsed.as_str())?.ok_or_else(|| not_found(id))
    }

    /// Newest request first.
    pub fn list_movements(
        &self,
        status: Option<MovementStatus>,
    ) -> StockResult<Vec<MovementRequest>> {
        let mut requests: Vec<MovementRequest> = store::scan_all(&self.store.movements)?;
        requests.retain(|r| status.is_none_or(|s| r.status == s));
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    /// Append a free-form entry to a request's trail.
    pub fn append_log(
        &self,
        id: &str,
        action: &str,
        actor: &UserId,
        metadata: Metadata,
    ) -> StockResult<MovementLog> {
        let (_, entry) = self.transition(id, |_, logs, _, request| {
            append_in(logs, request, action, actor, &metadata)
        })?;
        debug!(movement_id = %entry.movement, action = %entry.action, "log appended");
        Ok(entry)
    }

    /// One request's trail, newest first.
    pub fn logs_for_movement(&self, id: &str) -> StockResult<Vec<MovementLog>> {
        let request = self.get_movement(id)?;
        let mut entries: Vec<MovementLog> =
            store::scan_prefix(&self.store.movement_logs, &audit::trail_prefix(&request.id))?;
        entries.reverse();
        Ok(entries)
    }

    /// Filtered log listing, newest first. `limit` defaults to the configured page size
    /// and is clamped to `1..=500`.
    pub fn list_logs(&self, filter: &LogFilter, limit: Option<usize>) -> StockResult<Vec<MovementLog>> {
        let limit = audit::clamp_limit(limit, self.log_page_limit);
        let mut entries: Vec<MovementLog> = match &filter.movement {
            Some(movement) => {
                store::scan_prefix(&self.store.movement_logs, &audit::trail_prefix(movement))?
            }
            None => store::scan_all(&self.store.movement_logs)?,
        };
        entries.retain(|entry| filter.matches(entry));
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.payload().cmp(&a.id.payload()))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// Recompute the digest chain of a request's trail.
    pub fn verify_trail(&self, id: &str) -> StockResult<bool> {
        let request = self.get_movement(id)?;
        let entries: Vec<MovementLog> =
            store::scan_prefix(&self.store.movement_logs, &audit::trail_prefix(&request.id))?;
        audit::verify_chain(&entries, request.trail_head.as_deref())
    }

    pub fn resolve_descendant_groups(&self, id: &str) -> StockResult<BTreeSet<GroupId>> {
        self.catalog.descendants_and_self(id)
    }

    /// Load a request, let `step` mutate it (and the ledger and trail), write it back,
    /// all in one transaction. `step` may run more than once.
    fn transition<R, F>(&self, id: &str, step: F) -> StockResult<(MovementRequest, R)>
    where
        F: Fn(
            &TransactionalTree,
            &TransactionalTree,
            &TransactionalTree,
            &mut MovementRequest,
        ) -> ConflictableTransactionResult<R, StockError>,
    {
        let parsed = MovementId::parse(id).ok_or_else(|| not_found(id))?;

        let committed = (
            &self.store.items,
            &self.store.movements,
            &self.store.movement_logs,
            &self.store.location_refs,
        )
            .transaction(|(items, movements, logs, refs)| -> ConflictableTransactionResult<_, StockError> {
                let Some(mut request) = tx_get::<MovementRequest>(movements, parsed.as_str())?
                else {
                    return abort(Err(not_found(id)));
                };
                let output = step(items, logs, refs, &mut request)?;
                tx_put(movements, request.id.as_str().as_bytes(), &request)?;
                Ok((request, output))
            })?;
        Ok(committed)
    }
}

fn not_found(id: &str) -> StockError {
    StockError::NotFound {
        entity: "movement",
        id: id.to_string(),
    }
}

/// Transactional counterpart of `Catalog::must_exist` for ids already parsed.
fn recheck_location(
    locations: &TransactionalTree,
    id: &LocationId,
    require_warehouse: bool,
) -> ConflictableTransactionResult<Location, StockError> {
    let Some(location) = tx_get::<Location>(locations, id.as_str())? else {
        return abort(Err(StockError::LocationNotFound(id.to_string())));
    };
    abort(location.ensure_usable(require_warehouse))?;
    Ok(location)
}

/// Write one trail entry and advance the request's trail head.
fn append_in(
    logs: &TransactionalTree,
    request: &mut MovementRequest,
    action: &str,
    actor: &UserId,
    metadata: &Metadata,
) -> ConflictableTransactionResult<MovementLog, StockError> {
    let entry = abort(MovementLog::new(
        request.id.clone(),
        action,
        actor.clone(),
        metadata.clone(),
        request.trail_head.clone(),
    ))?;
    let key = abort(entry.key())?;
    tx_put(logs, &key, &entry)?;
    request.trail_head = Some(abort(entry.digest())?);
    Ok(entry)
}

/// Debit the source, credit the destination, mark the request executed.
fn execute_in(
    items: &TransactionalTree,
    logs: &TransactionalTree,
    refs: &TransactionalTree,
    request: &mut MovementRequest,
    actor: &UserId,
    metadata: &Metadata,
) -> ConflictableTransactionResult<(), StockError> {
    let Some(mut item) = tx_get::<Item>(items, request.item.as_str())? else {
        return Err(ConflictableTransactionError::Abort(StockError::ItemNotFound(
            request.item.to_string(),
        )));
    };
    if request.from == request.to {
        return abort(Err(StockError::Validation(
            "movement has no distinct source and destination".into(),
        )));
    }

    let held = (item.stock.holds(&request.from), item.stock.holds(&request.to));
    abort(item.stock.adjust(&request.from, request.quantity.negate()))?;
    abort(item.stock.adjust(&request.to, request.quantity.into()))?;
    track_holding(refs, &request.from, held.0, item.stock.holds(&request.from))?;
    track_holding(refs, &request.to, held.1, item.stock.holds(&request.to))?;
    item.touch();
    tx_put(items, item.id.as_str().as_bytes(), &item)?;

    abort(request.mark_executed(actor))?;
    append_in(logs, request, actions::EXECUTED, actor, metadata)?;
    Ok(())
}
