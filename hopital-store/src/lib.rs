pub mod credentials;
pub mod departments;
pub mod error;
pub mod profiles;
pub mod records;
pub mod sqlite_audit;
pub mod sqlite_store;

pub use credentials::{NewAccount, PasswordReset};
pub use error::{Result, StoreError};
pub use profiles::{ProfileCounts, ProfileFilter};
pub use records::{RecordFilter, RecordPage, StoredRecord, TransactionTotals};
pub use sqlite_audit::{AuditEntry, AuditLog, AuditRecord, Operation};
pub use sqlite_store::SqliteStore;
