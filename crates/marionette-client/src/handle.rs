//! Remote object handles
//!
//! An [`ObjectHandle`] owns one pinned remote address. Reads prefer a
//! per-object snapshot fetched once on first access; anything not in
//! the snapshot falls back to a live field read. Release is explicit:
//! the handle never unpins on drop, so forgetting one leaks a pin on
//! the agent rather than silently invalidating shared state.

use crate::providers::AgentConnection;
use marionette_common::error::{Error, Result};
use marionette_common::types::RemoteValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct ObjectHandle {
    agent: Arc<dyn AgentConnection>,
    address: u64,
    type_full_name: String,
    released: AtomicBool,
    /// Member values from the one-time object dump, lazily fetched
    snapshot: Mutex<Option<HashMap<String, RemoteValue>>>,
}

impl ObjectHandle {
    pub fn new(agent: Arc<dyn AgentConnection>, address: u64, type_full_name: &str) -> Self {
        Self {
            agent,
            address,
            type_full_name: type_full_name.to_string(),
            released: AtomicBool::new(false),
            snapshot: Mutex::new(None),
        }
    }

    /// Handle whose snapshot is pre-seeded from an object dump already
    /// in hand, avoiding a second dump on first read.
    pub fn with_snapshot(
        agent: Arc<dyn AgentConnection>,
        address: u64,
        type_full_name: &str,
        members: HashMap<String, RemoteValue>,
    ) -> Self {
        Self {
            agent,
            address,
            type_full_name: type_full_name.to_string(),
            released: AtomicBool::new(false),
            snapshot: Mutex::new(Some(members)),
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn type_full_name(&self) -> &str {
        &self.type_full_name
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn check_released(&self) -> Result<()> {
        if self.is_released() {
            return Err(Error::UseAfterRelease(self.address));
        }
        Ok(())
    }

    /// Read a field, answering from the snapshot when it covers the
    /// name and falling back to a live read otherwise.
    pub fn get_field(&self, name: &str) -> Result<RemoteValue> {
        self.check_released()?;

        {
            let mut snapshot = self.snapshot.lock();
            if snapshot.is_none() {
                let dump = self.agent.dump_object(self.address)?;
                trace!(
                    target: "marionette::handle",
                    address = format_args!("{:#x}", self.address),
                    members = dump.members.len(),
                    "Fetched object snapshot"
                );
                *snapshot = Some(
                    dump.members
                        .into_iter()
                        .map(|m| (m.name, m.value))
                        .collect(),
                );
            }
            if let Some(value) = snapshot.as_ref().and_then(|s| s.get(name)) {
                return Ok(value.clone());
            }
        }

        // Not in the snapshot (added later, or a property-backed slot)
        self.agent
            .get_field(self.address, &self.type_full_name, name)
    }

    /// Read a property through its `get_X` accessor, bypassing the
    /// snapshot. Raw counterpart of the proxy's property dispatch.
    pub fn get_property(&self, name: &str) -> Result<Option<RemoteValue>> {
        self.check_released()?;
        self.agent.invoke(
            self.address,
            &self.type_full_name,
            &format!("get_{name}"),
            &[],
            &[],
        )
    }

    pub fn set_field(&self, name: &str, value: &RemoteValue) -> Result<()> {
        self.check_released()?;
        self.agent
            .set_field(self.address, &self.type_full_name, name, value)?;
        // Keep a stale snapshot entry from shadowing the write
        if let Some(snapshot) = self.snapshot.lock().as_mut() {
            snapshot.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    pub fn invoke(
        &self,
        method_key: &str,
        generic_args: &[String],
        args: &[RemoteValue],
    ) -> Result<Option<RemoteValue>> {
        self.check_released()?;
        self.agent.invoke(
            self.address,
            &self.type_full_name,
            method_key,
            generic_args,
            args,
        )
    }

    /// Re-fetch the member snapshot. Known limitation: not implemented
    /// yet, fails fast instead of silently doing nothing.
    pub fn refresh(&self) -> Result<()> {
        self.check_released()?;
        Err(Error::NotSupported(
            "object snapshot refresh is not supported yet".to_string(),
        ))
    }

    /// Release the remote pin. Idempotent at the handle level, but the
    /// unpin request goes out exactly once.
    pub fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(
            target: "marionette::handle",
            address = format_args!("{:#x}", self.address),
            type_full_name = %self.type_full_name,
            "Releasing object handle"
        );
        self.agent.unpin(self.address)
    }
}

impl std::fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("address", &format_args!("{:#x}", self.address))
            .field("type_full_name", &self.type_full_name)
            .field("released", &self.is_released())
            .finish()
    }
}
