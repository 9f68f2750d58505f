//! Append-only transaction log for saga orchestration.
//!
//! Every status change of a participant inside a saga is a new
//! [`TransactionLogEntry`]; rows are never updated or deleted. The outbox
//! table lives next to the log so a saga's initial rows and its start event
//! can be written in one atomic unit.

pub mod entry;
pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod status;
pub mod store;

pub use common::{OrderId, ServiceName, TxId};
pub use entry::TransactionLogEntry;
pub use error::{Result, TransactionLogError};
pub use memory::InMemoryTransactionLogStore;
pub use outbox::{NewOutboxEvent, ORDER_CONFIRMED, OutboxEvent};
pub use postgres::PostgresTransactionLogStore;
pub use status::TransactionStatus;
pub use store::{
    OutboxStore, TransactionLogStore, TransactionLogStoreExt, UnfinishedTransaction,
    latest_per_service,
};
