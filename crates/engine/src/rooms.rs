use serde::{Deserialize, Serialize};

/// Active room and how many rooms the player has unlocked. `current_room`
/// always lies in `1..=rooms_unlocked`; rooms are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    current_room: u32,
    rooms_unlocked: u32,
    /// False while the "new room unlocked" notice is still pending.
    #[serde(default = "unlock_seen_default")]
    unlock_seen: bool,
}

fn unlock_seen_default() -> bool {
    true
}

impl Default for RoomState {
    fn default() -> Self {
        Self {
            current_room: 1,
            rooms_unlocked: 1,
            unlock_seen: true,
        }
    }
}

impl RoomState {
    pub fn new(current_room: u32, rooms_unlocked: u32) -> Self {
        let mut state = Self {
            current_room,
            rooms_unlocked,
            unlock_seen: true,
        };
        state.normalize();
        state
    }

    pub fn with_unlock_seen(mut self, seen: bool) -> Self {
        self.unlock_seen = seen;
        self
    }

    pub fn current_room(&self) -> u32 {
        self.current_room
    }

    pub fn rooms_unlocked(&self) -> u32 {
        self.rooms_unlocked
    }

    pub fn unlock_seen(&self) -> bool {
        self.unlock_seen
    }

    /// Any unlocked room is reachable in one step. Returns false, leaving the
    /// state untouched, when `room` is the current room or not unlocked.
    pub fn navigate_to(&mut self, room: u32) -> bool {
        if room == self.current_room || room == 0 || room > self.rooms_unlocked {
            return false;
        }
        self.current_room = room;
        true
    }

    pub fn unlock_next(&mut self, max_rooms: Option<u32>) -> bool {
        if max_rooms.is_some_and(|max| self.rooms_unlocked >= max) {
            return false;
        }
        self.rooms_unlocked = self.rooms_unlocked.saturating_add(1);
        self.unlock_seen = false;
        true
    }

    pub fn acknowledge_unlock(&mut self) {
        self.unlock_seen = true;
    }

    /// Forces `1 <= current_room <= rooms_unlocked`. Returns whether anything changed.
    pub fn normalize(&mut self) -> bool {
        let before = *self;
        self.rooms_unlocked = self.rooms_unlocked.max(1);
        self.current_room = self.current_room.clamp(1, self.rooms_unlocked);
        before != *self
    }
}
