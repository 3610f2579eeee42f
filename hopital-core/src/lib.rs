pub mod access;
pub mod department;
pub mod error;
pub mod export;
pub mod notice;
pub mod profile;
pub mod record;
pub mod role;

pub use access::{can_modify_record, AccessPolicy, Decision, DenyReason, Section, SectionRule, Subject};
pub use department::{Department, DepartmentAssignment, DEFAULT_DEPARTMENTS};
pub use error::{HopitalError, Result};
pub use export::{ExportFormat, Table};
pub use notice::{Notice, NoticeCode, NoticeLevel};
pub use profile::{NewProfile, Profile, ProfileUpdate, SettingsUpdate};
pub use record::{NormalizedRecord, RecordKind, TransactionKind};
pub use role::Role;
