//! Serial port enumeration and before/after change detection.
//!
//! A device that reboots into a different USB mode re-enumerates under a new
//! port name. Taking a snapshot of the visible ports on either side of the
//! reboot is how the new name is found.
use std::collections::BTreeSet;
use std::future::Future;

use crate::serial::Result;

/// Events derived from comparing two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    /// A serial port was added
    PortAdded(String),
    /// A serial port was removed
    PortRemoved(String),
}

/// The set of port names visible at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSnapshot {
    ports: BTreeSet<String>,
}

impl PortSnapshot {
    pub fn from_ports<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ports: ports.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, port: &str) -> bool {
        self.ports.contains(port)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(String::as_str)
    }

    /// The port present in `after` but not in `before`.
    ///
    /// When several ports appear at once one of them is returned without
    /// any attempt to tell which belongs to our device.
    pub fn diff(before: &PortSnapshot, after: &PortSnapshot) -> Option<String> {
        let mut appeared = after.ports.difference(&before.ports);
        let first = appeared.next()?.clone();
        let extra = appeared.count();
        if extra > 0 {
            log::warn!(
                "{} ports appeared at once, picking {}",
                extra + 1,
                first
            );
        }
        Some(first)
    }
}

/// Source of port snapshots
pub trait PortEnumerator {
    fn snapshot(&self) -> Result<PortSnapshot>;
}

/// Enumerates ports through the OS device list
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn snapshot(&self) -> Result<PortSnapshot> {
        let ports = serialport::available_ports().map_err(|e| {
            log::error!("Failed to enumerate serial ports: {}", e);
            e
        })?;
        Ok(PortSnapshot::from_ports(ports.into_iter().map(|p| p.port_name)))
    }
}

/// Ports seen before and after some action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChange {
    pub before: PortSnapshot,
    pub after: PortSnapshot,
}

impl PortChange {
    /// The newly appeared port, if any
    pub fn new_port(&self) -> Option<String> {
        PortSnapshot::diff(&self.before, &self.after)
    }

    pub fn events(&self) -> Vec<PortEvent> {
        let added = self
            .after
            .ports
            .difference(&self.before.ports)
            .map(|p| PortEvent::PortAdded(p.clone()));
        let removed = self
            .before
            .ports
            .difference(&self.after.ports)
            .map(|p| PortEvent::PortRemoved(p.clone()));
        added.chain(removed).collect()
    }
}

/// Watches for a port appearing while an action runs.
///
/// `begin` takes the "before" snapshot; `finish` takes the "after" one and
/// yields the `PortChange`. Prefer [`PortChangeDetector::scope`], which
/// always takes the second snapshot however the action ends.
pub struct PortChangeDetector<'a, E: PortEnumerator> {
    enumerator: &'a E,
    before: PortSnapshot,
}

impl<'a, E: PortEnumerator> PortChangeDetector<'a, E> {
    pub fn begin(enumerator: &'a E) -> Result<Self> {
        let before = enumerator.snapshot()?;
        log::debug!("Ports before: {:?}", before);
        Ok(Self { enumerator, before })
    }

    pub fn finish(self) -> Result<PortChange> {
        let after = self.enumerator.snapshot()?;
        log::debug!("Ports after: {:?}", after);
        let change = PortChange {
            before: self.before,
            after,
        };
        for event in change.events() {
            log::info!("Port change detected: {:?}", event);
        }
        Ok(change)
    }

    /// Run `action` between the two snapshots.
    ///
    /// The action's output is handed back untouched, so an action that
    /// returns an error still gets its "after" snapshot taken.
    pub async fn scope<F, Fut, T>(enumerator: &'a E, action: F) -> Result<(T, PortChange)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let detector = Self::begin(enumerator)?;
        let output = action().await;
        let change = detector.finish()?;
        Ok((output, change))
    }
}
