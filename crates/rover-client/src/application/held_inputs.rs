//! Per-source bookkeeping of held motion flags.
//!
//! Keyboards auto-repeat, touch surfaces report the same region many times
//! while a finger drags across it, and two sources may hold the same flag at
//! once.  `HeldInputs` filters those into exactly one `begin` per newly held
//! flag and one `end` per flag that no source holds any more, which is the
//! contract [`super::motion_intent::MotionIntentEngine`] relies on.

use std::collections::{BTreeMap, BTreeSet};

use rover_core::{CameraFlag, DriveFlag};

/// Where an input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSource {
    Keyboard,
    Touch,
    Pointer,
}

/// A flag of either mask family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeldFlag {
    Drive(DriveFlag),
    Camera(CameraFlag),
}

/// Which sources currently hold which flags.
#[derive(Debug, Default)]
pub struct HeldInputs {
    holders: BTreeMap<HeldFlag, BTreeSet<InputSource>>,
}

impl HeldInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `source` holds `flag`.
    ///
    /// Returns `false` when `source` already held it (auto-repeat); the
    /// caller should not `begin` again.
    pub fn press(&mut self, source: InputSource, flag: HeldFlag) -> bool {
        self.holders.entry(flag).or_default().insert(source)
    }

    /// Records that `source` let go of `flag`.
    ///
    /// Returns `true` only when `source` held the flag and no other source
    /// still does, i.e. when the caller should `end` it.
    pub fn release(&mut self, source: InputSource, flag: HeldFlag) -> bool {
        let Some(sources) = self.holders.get_mut(&flag) else {
            return false;
        };
        if !sources.remove(&source) {
            return false;
        }
        if sources.is_empty() {
            self.holders.remove(&flag);
            true
        } else {
            false
        }
    }

    /// Releases everything `source` holds (focus loss, touch cancel).
    ///
    /// Returns the flags the caller should `end`, in a stable order.
    pub fn release_all(&mut self, source: InputSource) -> Vec<HeldFlag> {
        let held: Vec<HeldFlag> = self
            .holders
            .iter()
            .filter(|(_, sources)| sources.contains(&source))
            .map(|(flag, _)| *flag)
            .collect();
        held.into_iter()
            .filter(|flag| self.release(source, *flag))
            .collect()
    }

    /// `true` if any source holds `flag`.
    #[cfg(test)]
    fn is_held(&self, flag: HeldFlag) -> bool {
        self.holders.contains_key(&flag)
    }

    /// Forgets every hold.
    pub fn clear(&mut self) {
        self.holders.clear();
    }
}
