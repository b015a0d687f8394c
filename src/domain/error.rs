//! Domain error types.
//!
//! Three layers: [`OrderRejection`] and [`ExecutionError`] are recoverable per-order
//! outcomes that never stop a simulation, [`BusError`] guards dispatch-mode misuse, and
//! [`AlphaMintError`] covers everything around the kernel (config, data, reports).

use crate::domain::event_bus::DispatchMode;

/// Why the portfolio refused to turn a signal into an order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderRejection {
    #[error("{symbol}: invalid price {price}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("{symbol}: invalid quantity {quantity}")]
    InvalidQuantity { symbol: String, quantity: i64 },

    #[error("{symbol}: insufficient cash (need {required:.2}, available {available:.2})")]
    InsufficientCash {
        symbol: String,
        required: f64,
        available: f64,
    },

    #[error(
        "{symbol}: position cap exceeded (target {target_fraction:.4} of equity, cap {cap:.4})"
    )]
    PositionCapExceeded {
        symbol: String,
        target_fraction: f64,
        cap: f64,
    },

    #[error("{symbol}: insufficient sellable shares (need {requested}, available {available})")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        available: i64,
    },
}

/// Why an execution handler refused to fill an order.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{symbol}: no cached price")]
    NoPrice { symbol: String },

    #[error("{symbol}: buy quantity {quantity} is not a multiple of lot size {lot_size}")]
    LotSizeViolation {
        symbol: String,
        quantity: i64,
        lot_size: i64,
    },

    #[error("{symbol}: invalid quantity {quantity}")]
    InvalidQuantity { symbol: String, quantity: i64 },

    #[error("{symbol}: limit orders are not supported")]
    UnsupportedOrderKind { symbol: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("event bus already used in {active} mode, cannot switch to {requested}")]
    ModeConflict {
        active: DispatchMode,
        requested: DispatchMode,
    },
}

/// Top-level error type for alphamint.
#[derive(Debug, thiserror::Error)]
pub enum AlphaMintError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error("logging setup failed: {reason}")]
    Logging { reason: String },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlphaMintError {
    /// Process exit status for this error category.
    pub fn exit_status(&self) -> u8 {
        match self {
            AlphaMintError::Io(_) | AlphaMintError::Logging { .. } => 1,
            AlphaMintError::ConfigParse { .. }
            | AlphaMintError::ConfigMissing { .. }
            | AlphaMintError::ConfigInvalid { .. } => 2,
            AlphaMintError::Data { .. }
            | AlphaMintError::NoData { .. }
            | AlphaMintError::Csv(_) => 5,
            AlphaMintError::Report { .. } => 6,
            AlphaMintError::Bus(_) => 7,
        }
    }
}

impl From<&AlphaMintError> for std::process::ExitCode {
    fn from(err: &AlphaMintError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
