//! Transaction pipeline: assembly, fee selection, signature recovery and broadcast

mod broadcast;
mod builder;
mod gas;
mod monitor;
mod recovery;
mod sender;
mod transaction;

pub use broadcast::{BroadcastOutcome, Broadcaster};
pub use builder::{display_units, PreparedTransaction, SendRequest};
pub use gas::{FeeOracle, GasNowOracle};
pub use recovery::{RecoveryEncoding, RecoveryResolver};
pub use sender::{SendReceipt, TransactionSender};
pub use transaction::SigningDigest;

#[cfg(test)]
pub use broadcast::MockBroadcaster;
#[cfg(test)]
pub use gas::{FeeQuote, MockFeeOracle};
#[cfg(test)]
pub use transaction::UnsignedTransaction;
