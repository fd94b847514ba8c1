use std::collections::HashMap;

/// Identity fields stamped on outbound envelopes without a DB hit
///, populated once at attach.
#[derive(Debug, Clone, Default)]
pub struct IdentitySnapshot {
    pub nickname: String,
    pub avatar: String,
}

/// Per-user state shared across all of a user's connected devices
///. Exists only for the lifetime of at least one open
/// connection; released on the last `detach`.
#[derive(Debug, Default)]
pub struct UserSession {
    pub identity: IdentitySnapshot,
    read_list: HashMap<u64, u64>,
}

impl UserSession {
    pub fn new(identity: IdentitySnapshot) -> Self {
        Self {
            identity,
            read_list: HashMap::new(),
        }
    }

    /// Merge an incoming read-cursor update: `new = max(old, incoming)`
    ///. Commutative and idempotent regardless of call
    /// order, so concurrent `read_ack`s from multiple devices never regress
    /// the cursor.
    pub fn merge_read(&mut self, room_id: u64, last_read_msg_id: u64) -> u64 {
        let merged = self
            .read_list
            .get(&room_id)
            .copied()
            .map_or(last_read_msg_id, |current| current.max(last_read_msg_id));
        self.read_list.insert(room_id, merged);
        merged
    }

    pub fn read_cursor(&self, room_id: u64) -> Option<u64> {
        self.read_list.get(&room_id).copied()
    }

    /// Snapshot every room's cursor, for a C7 flush.
    pub fn read_list_snapshot(&self) -> HashMap<u64, u64> {
        self.read_list.clone()
    }

    /// Seed cursors bootstrapped from storage on first attach, without
    /// regressing any cursor a faster-attaching device may already have
    /// merged in.
    pub fn seed_read_list(&mut self, snapshot: HashMap<u64, u64>) {
        for (room_id, last_read_msg_id) in snapshot {
            self.merge_read(room_id, last_read_msg_id);
        }
    }
}
