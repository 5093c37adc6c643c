//! Object snapshots, heap candidates and module listings

use crate::types::descriptor::RuntimeKind;
use crate::types::value::RemoteValue;
use serde::{Deserialize, Serialize};

/// Member-value snapshot of one pinned object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Pinned address token of the object
    pub address: u64,
    /// Declared full type name
    pub type_full_name: String,
    /// Member values captured at dump time
    #[serde(default)]
    pub members: Vec<SnapshotMember>,
}

/// One captured member value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMember {
    pub name: String,
    pub value: RemoteValue,
}

/// One candidate instance returned by a heap query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapCandidate {
    pub address: u64,
    pub type_full_name: String,
}

/// One module loaded in the target process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub runtime: RuntimeKind,
    /// Load address of a native module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_address: Option<u64>,
}
