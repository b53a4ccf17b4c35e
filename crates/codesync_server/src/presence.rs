//! Device presence registry.
//!
//! Devices announce themselves with periodic heartbeats. A device is active
//! while `now - last_heartbeat < ttl`; the reaper drops everything else.

use codesync_protocol::{Clock, DeviceView, PresenceView};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A device known to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Opaque device token.
    pub id: String,
    /// Time of the last heartbeat (Unix millis).
    pub last_heartbeat: u64,
}

impl Device {
    fn is_active(&self, now: u64, ttl_millis: u64) -> bool {
        now.saturating_sub(self.last_heartbeat) < ttl_millis
    }

    /// Converts into the wire representation.
    pub fn to_view(&self) -> DeviceView {
        DeviceView {
            id: self.id.clone(),
            last_heartbeat: self.last_heartbeat,
        }
    }
}

/// Tracks device liveness.
pub struct PresenceRegistry {
    devices: RwLock<HashMap<String, u64>>,
    ttl_millis: u64,
    clock: Arc<dyn Clock>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            ttl_millis: ttl.as_millis() as u64,
            clock,
        }
    }

    /// Returns the staleness window in milliseconds.
    pub fn ttl_millis(&self) -> u64 {
        self.ttl_millis
    }

    /// Records a heartbeat, creating the device on first contact.
    pub fn heartbeat(&self, device_id: &str) -> Device {
        let now = self.clock.now_millis();
        self.devices.write().insert(device_id.to_string(), now);
        Device {
            id: device_id.to_string(),
            last_heartbeat: now,
        }
    }

    /// Removes every device whose heartbeat is at least one TTL old.
    ///
    /// The live set is recomputed from scratch on each call, so a missed
    /// reap never leaves stale devices behind for longer than one extra tick.
    pub fn reap(&self, now: u64) -> Vec<String> {
        let ttl = self.ttl_millis;
        let mut devices = self.devices.write();

        let mut removed = Vec::new();
        devices.retain(|id, last_heartbeat| {
            let alive = now.saturating_sub(*last_heartbeat) < ttl;
            if !alive {
                removed.push(id.clone());
            }
            alive
        });

        if !removed.is_empty() {
            debug!(count = removed.len(), "reaped stale devices");
        }
        removed.sort();
        removed
    }

    /// Returns all devices passing the TTL check at `now`, ordered by id.
    pub fn list_active(&self, now: u64) -> Vec<Device> {
        let mut active: Vec<Device> = self
            .devices
            .read()
            .iter()
            .map(|(id, last_heartbeat)| Device {
                id: id.clone(),
                last_heartbeat: *last_heartbeat,
            })
            .filter(|device| device.is_active(now, self.ttl_millis))
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    /// Returns true if the device is active at `now`.
    pub fn is_active(&self, device_id: &str, now: u64) -> bool {
        self.devices
            .read()
            .get(device_id)
            .is_some_and(|last| now.saturating_sub(*last) < self.ttl_millis)
    }

    /// Returns the active devices at the clock's current reading.
    pub fn snapshot(&self) -> PresenceView {
        let now = self.clock.now_millis();
        PresenceView {
            active_devices: self.list_active(now).iter().map(Device::to_view).collect(),
            ttl_millis: self.ttl_millis,
        }
    }

    /// Returns the number of tracked devices, stale or not.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Returns true if no device is tracked.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
