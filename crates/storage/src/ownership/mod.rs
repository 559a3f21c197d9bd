//! Ownership record types and the store trait the ownership guard queries.
//!
//! The ownership store is the source of truth for "who owns which resource".
//! It is an external collaborator (the project repository in production); this
//! module only defines the narrow interface the guard needs and an in-memory
//! implementation for tests and development.
//!
//! # Resource Lifecycle
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Active    │────►│  Archived   │────►│  Deleted    │
//! │             │◄────│ (reversible)│     │ (terminal)  │
//! └──────┬──────┘     └─────────────┘     └─────────────┘
//!        │                                       ▲
//!        └───────────────────────────────────────┘
//! ```
//!
//! A `Deleted` resource is never accessible. The only way to build an
//! "accessible" state filter is [`StateConstraint::accessible`], which cannot
//! include `Deleted`.
//!
//! # Examples
//!
//! ```
//! use warden_storage::ownership::{
//!     MemoryOwnershipStore, OwnershipFilter, OwnershipRecordStore, ResourceRecord, ResourceState,
//!     StateConstraint,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemoryOwnershipStore::new();
//! store.insert(ResourceRecord::new("r1", "u1", ResourceState::Active));
//!
//! let filter = OwnershipFilter::owned_by("r1", "u1", StateConstraint::accessible(false));
//! assert!(store.find_one(&filter).await.unwrap().is_some());
//! # });
//! ```

mod record;
mod store;

pub use record::{OwnershipFilter, ResourceRecord, ResourceState, StateConstraint, StateMatch};
pub use store::{MemoryOwnershipStore, OwnershipRecordStore};
