#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod invariants;
pub mod memory;
pub mod models;
pub mod operations;
pub mod store;

pub mod prelude {
    #[cfg(feature = "sqlx")]
    pub use crate::db::{PgTagStore, PgTagStoreConfig, create_tag_tables};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::hierarchy::{resolve_ancestors, resolve_descendants};
    pub use crate::invariants::{closure_violations, ensure_closure};
    pub use crate::memory::{MemoryTagStore, StoreCallCounts};
    pub use crate::models::{
        AddPeopleToTagPayload, AssignmentKey, ClosureViolation, OrganizationId,
        SelectedTagsPayload, Tag, TagAssignment, TagId, TagsAssignedToUserQuery, UserId,
    };
    pub use crate::operations::{TagOperation, TagOperationResult, TagOperations};
    pub use crate::store::{TagStore, UserDirectory};
}
