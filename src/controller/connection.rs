//! Connection tracking
//!
//! Publishes "is any controller connected" and the current device list through watch
//! channels so UI code can react without polling.

use crate::controller::snapshot::{DeviceInfo, DeviceSnapshot};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ConnectionTracker {
    connected: watch::Sender<bool>,
    devices: watch::Sender<Vec<DeviceInfo>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(false);
        let (devices, _) = watch::channel(Vec::new());
        Self { connected, devices }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn subscribe_devices(&self) -> watch::Receiver<Vec<DeviceInfo>> {
        self.devices.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.devices.borrow().clone()
    }

    pub fn on_connected(&self, info: DeviceInfo) {
        if !info.is_standard() {
            warn!(
                "The connected gamepad might not be supported. Mapping name: {:?}",
                info.mapping
            );
        }
        info!("Gamepad {} connected: {}", info.index, info.name);

        self.devices.send_modify(|devices| {
            devices.retain(|known| known.index != info.index);
            devices.push(info);
            devices.sort_by_key(|device| device.index);
        });
        self.recompute();
    }

    pub fn on_disconnected(&self, index: usize) {
        info!("Gamepad {} disconnected", index);
        self.devices
            .send_modify(|devices| devices.retain(|known| known.index != index));
        self.recompute();
    }

    /// Reconciles the published list with the live snapshot list
    ///
    /// Covers devices that were present before the source started emitting events.
    /// Returns true when the list changed.
    pub fn sync(&self, snapshots: &[DeviceSnapshot]) -> bool {
        let live: Vec<DeviceInfo> = snapshots.iter().map(DeviceSnapshot::info).collect();
        let changed = self.devices.send_if_modified(|devices| {
            if *devices == live {
                false
            } else {
                *devices = live.clone();
                true
            }
        });
        if changed {
            debug!("Device list resynchronized: {} device(s)", live.len());
            self.recompute();
        }
        changed
    }

    fn recompute(&self) {
        let any = !self.devices.borrow().is_empty();
        self.connected.send_if_modified(|connected| {
            if *connected == any {
                false
            } else {
                *connected = any;
                true
            }
        });
    }
}
