//! sled-backed persistence handle. Records are CBOR, keyed by their identifier string.
use super::error::{StockError, StockResult};
use sled::Tree;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};

const ITEMS: &str = "items";
const ITEM_CODES: &str = "item_codes";
const LOCATIONS: &str = "locations";
const GROUPS: &str = "groups";
const GROUP_NAMES: &str = "group_names";
const MOVEMENTS: &str = "movements";
const MOVEMENT_LOGS: &str = "movement_logs";
const LOCATION_REFS: &str = "location_refs";

/// Open database plus one tree per collection. Cheap to clone; every clone shares the
/// same underlying database.
#[derive(Clone, Debug)]
pub struct Store {
    db: sled::Db,
    pub(crate) items: Tree,
    pub(crate) item_codes: Tree,
    pub(crate) locations: Tree,
    pub(crate) groups: Tree,
    pub(crate) group_names: Tree,
    pub(crate) movements: Tree,
    pub(crate) movement_logs: Tree,
    /// Location id → big-endian u64: requests naming the location plus ledger entries
    /// held there. Written only inside transactions.
    pub(crate) location_refs: Tree,
}

impl Store {
    pub fn from_db(db: sled::Db) -> StockResult<Self> {
        Ok(Self {
            items: db.open_tree(ITEMS)?,
            item_codes: db.open_tree(ITEM_CODES)?,
            locations: db.open_tree(LOCATIONS)?,
            groups: db.open_tree(GROUPS)?,
            group_names: db.open_tree(GROUP_NAMES)?,
            movements: db.open_tree(MOVEMENTS)?,
            movement_logs: db.open_tree(MOVEMENT_LOGS)?,
            location_refs: db.open_tree(LOCATION_REFS)?,
            db,
        })
    }

    /// Flush dirty pages; call on shutdown.
    pub fn flush(&self) -> StockResult<usize> {
        Ok(self.db.flush()?)
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> StockResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn decode<T>(bytes: &[u8]) -> StockResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

pub(crate) fn get<T>(tree: &Tree, key: &str) -> StockResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.get(key.as_bytes())?
        .map(|bytes| decode(&bytes))
        .transpose()
}

pub(crate) fn put<T: minicbor::Encode<()>>(tree: &Tree, key: &str, value: &T) -> StockResult<()> {
    tree.insert(key.as_bytes(), encode(value)?)?;
    Ok(())
}

pub(crate) fn scan_all<T>(tree: &Tree) -> StockResult<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.iter()
        .values()
        .map(|value| decode(&value?))
        .collect()
}

pub(crate) fn scan_prefix<T>(tree: &Tree, prefix: &[u8]) -> StockResult<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.scan_prefix(prefix)
        .values()
        .map(|value| decode(&value?))
        .collect()
}

/// Turn a domain failure inside a transaction body into an abort.
pub(crate) fn abort<T>(result: StockResult<T>) -> ConflictableTransactionResult<T, StockError> {
    result.map_err(ConflictableTransactionError::Abort)
}

pub(crate) fn tx_get<T>(
    tree: &TransactionalTree,
    key: &str,
) -> ConflictableTransactionResult<Option<T>, StockError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => abort(decode(&bytes)).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn tx_put<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &[u8],
    value: &T,
) -> ConflictableTransactionResult<(), StockError> {
    let bytes = abort(encode(value))?;
    tree.insert(key, bytes)?;
    Ok(())
}

fn decode_count(bytes: &[u8]) -> StockResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StockError::Encoding(format!("reference count of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

pub(crate) fn count(tree: &Tree, key: &str) -> StockResult<u64> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => decode_count(&bytes),
        None => Ok(0),
    }
}

pub(crate) fn tx_count(
    tree: &TransactionalTree,
    key: &str,
) -> ConflictableTransactionResult<u64, StockError> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => abort(decode_count(&bytes)),
        None => Ok(0),
    }
}

/// Add `delta` to a counter, dropping the key when it reaches zero.
pub(crate) fn tx_shift(
    tree: &TransactionalTree,
    key: &str,
    delta: i64,
) -> ConflictableTransactionResult<u64, StockError> {
    let next = tx_count(tree, key)?.saturating_add_signed(delta);
    if next == 0 {
        tree.remove(key.as_bytes())?;
    } else {
        tree.insert(key.as_bytes(), &next.to_be_bytes()[..])?;
    }
    Ok(next)
}
