//! Common types used across storage operations.

use serde::{Deserialize, Serialize};

/// Memory and connection figures reported by a backend.
///
/// Figures a backend cannot report are left at zero.
///
/// # Examples
///
/// ```
/// use warden_storage::BackendInfo;
///
/// let info = BackendInfo { used_memory_bytes: 1024, connected_clients: 3, key_count: 10 };
/// assert_eq!(info.connected_clients, 3);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Memory used by the store, in bytes.
    pub used_memory_bytes: u64,

    /// Number of clients connected to the store.
    pub connected_clients: u64,

    /// Number of keys currently held.
    pub key_count: u64,
}
