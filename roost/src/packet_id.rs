// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::sync::Mutex;

use codec::v3::{PublishPacket, SubscribePacket, UnsubscribePacket};
use codec::PacketId;

/// The outbound request a packet identifier is bound to.
///
/// These are the three packet types which open an acknowledgement chain.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingPacket {
    Publish(PublishPacket),
    Subscribe(SubscribePacket),
    Unsubscribe(UnsubscribePacket),
}

/// Hands out unique non-zero 16bit packet identifiers and remembers the
/// request each one belongs to.
///
/// Identifiers are allocated in rising order starting at 1, skipping
/// entries still in flight, and freed only after the full acknowledgement
/// handshake completes. Safe for concurrent callers on one instance.
#[derive(Debug, Default)]
pub struct PacketIdAllocator {
    bindings: Mutex<HashMap<PacketId, PendingPacket>>,
}

impl PacketIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the lowest free identifier and bind it to `origin`.
    ///
    /// If all 65535 identifiers are in flight, which indicates a broker
    /// that has stopped acking or a producer outrunning the link, the
    /// allocator fails fast: it returns id 1 and overwrites that binding.
    pub fn next(&self, origin: PendingPacket) -> PacketId {
        let mut bindings = self.bindings.lock().unwrap();
        for raw in 1..u16::MAX {
            let id = PacketId::new(raw);
            if !bindings.contains_key(&id) {
                bindings.insert(id, origin);
                return id;
            }
        }
        log::warn!("packet_id: all identifiers in flight, reusing id 1");
        let id = PacketId::new(1);
        bindings.insert(id, origin);
        id
    }

    /// Overwrite the binding of an already allocated `id`.
    ///
    /// Used after the id has been stamped into the packet itself, so the
    /// stored request matches what goes on the wire.
    pub fn bind(&self, id: PacketId, origin: PendingPacket) {
        self.bindings.lock().unwrap().insert(id, origin);
    }

    /// Release `id` and return the request it was bound to.
    ///
    /// Must be called exactly once per [`Self::next`] call, after the
    /// acknowledgement chain for `id` has completed.
    pub fn free(&self, id: PacketId) -> Option<PendingPacket> {
        self.bindings.lock().unwrap().remove(&id)
    }

    /// Look up the request bound to `id` without releasing it.
    #[must_use]
    pub fn get(&self, id: PacketId) -> Option<PendingPacket> {
        self.bindings.lock().unwrap().get(&id).cloned()
    }

    /// Number of identifiers currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.lock().unwrap().is_empty()
    }
}
