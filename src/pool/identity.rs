use std::collections::HashSet;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::debug;

// -----------------------------------------------------------------------------
// ----- IdentityAllocator -----------------------------------------------------

/// Produces candidate client ids for (re)connect attempts.
///
/// The gateway rejects a second session that reuses a live client id, and
/// offers no way to ask which ids are taken; the only source of truth is a
/// failed attempt. Rejections are remembered for the life of the process,
/// since a collision on id X is informative for every future attempt, not
/// just the current one.
pub struct IdentityAllocator {
    base: i32,
    spread: u16,
    rejected: Mutex<HashSet<i32>>,
}

// -----------------------------------------------------------------------------
// ----- IdentityAllocator: Static ---------------------------------------------

impl IdentityAllocator {
    pub fn new(base: i32, spread: u16) -> Self {
        Self {
            base,
            spread,
            rejected: Mutex::new(HashSet::new()),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- IdentityAllocator: Public ---------------------------------------------

impl IdentityAllocator {
    /// The candidate sequence for one connect attempt: `base` leads when it is
    /// not excluded, the rest of `base+1 ..= base+spread` follows shuffled, so
    /// competing pool instances do not walk the same collision order. If the
    /// exclusion set would empty the sequence it resets instead, since the
    /// gateway may have freed an id since the rejection was recorded.
    pub fn candidates(&self) -> Vec<i32> {
        let all: Vec<i32> = (self.base..=self.base + i32::from(self.spread)).collect();

        let mut rejected = self.rejected.lock();
        let mut live: Vec<i32> = all
            .iter()
            .copied()
            .filter(|id| !rejected.contains(id))
            .collect();

        if live.is_empty() {
            debug!("all candidate client ids excluded; resetting rejection memory");
            rejected.clear();
            live = all;
        }
        drop(rejected);

        let mut rng = rand::rng();
        if let Some(pos) = live.iter().position(|&id| id == self.base) {
            live.swap(0, pos);
            live[1..].shuffle(&mut rng);
        } else {
            live.shuffle(&mut rng);
        }
        live
    }

    pub fn mark_rejected(&self, id: i32) {
        self.rejected.lock().insert(id);
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
