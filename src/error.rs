//! Error taxonomy for the stock core. Transport adapters map [`ErrorKind`]
//! to their own status codes; nothing in here knows about HTTP.
use super::movement::MovementStatus;
use super::quantity::Quantity;

/// Stable, transport-agnostic classification of a [`StockError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    LocationNotFound,
    LocationInactive,
    LocationTypeInvalid,
    ItemNotFound,
    NotFound,
    InvalidState,
    InsufficientStock,
    Conflict,
    Storage,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::LocationNotFound => "LOCATION_NOT_FOUND",
            ErrorKind::LocationInactive => "LOCATION_INACTIVE",
            ErrorKind::LocationTypeInvalid => "LOCATION_TYPE_INVALID",
            ErrorKind::ItemNotFound => "ITEM_NOT_FOUND",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StockError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid {field}: {message}")]
    InvalidQuantity { field: String, message: String },
    #[error("location {0} not found")]
    LocationNotFound(String),
    #[error("location {0} is inactive")]
    LocationInactive(String),
    #[error("location {0} must be a warehouse")]
    LocationTypeInvalid(String),
    #[error("item {0} not found")]
    ItemNotFound(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("movement {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        actual: MovementStatus,
        expected: MovementStatus,
    },
    #[error("insufficient stock at {location}: have {available}, need {requested}")]
    InsufficientStock {
        location: String,
        available: Quantity,
        requested: Quantity,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Encoding(String),
    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl StockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StockError::Validation(_) | StockError::InvalidQuantity { .. } => ErrorKind::Validation,
            StockError::LocationNotFound(_) => ErrorKind::LocationNotFound,
            StockError::LocationInactive(_) => ErrorKind::LocationInactive,
            StockError::LocationTypeInvalid(_) => ErrorKind::LocationTypeInvalid,
            StockError::ItemNotFound(_) => ErrorKind::ItemNotFound,
            StockError::NotFound { .. } => ErrorKind::NotFound,
            StockError::InvalidState { .. } => ErrorKind::InvalidState,
            StockError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            StockError::Conflict(_) => ErrorKind::Conflict,
            StockError::Storage(_) | StockError::Encoding(_) | StockError::Config(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub(crate) fn invalid_quantity(field: &str, message: impl Into<String>) -> Self {
        StockError::InvalidQuantity {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<minicbor::decode::Error> for StockError {
    fn from(value: minicbor::decode::Error) -> Self {
        StockError::Encoding(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for StockError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        StockError::Encoding(value.to_string())
    }
}

impl From<sled::transaction::TransactionError<StockError>> for StockError {
    fn from(value: sled::transaction::TransactionError<StockError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => StockError::Storage(err),
        }
    }
}

pub type StockResult<T> = Result<T, StockError>;
