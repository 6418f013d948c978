/// Tunables shared by the authority and clients.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InventoryConfig {
    /// Cap on entries (upserts plus removals) shipped in one replication
    /// delta. Changes captured together are never split across frames, so a
    /// single large capture may exceed the cap.
    pub max_delta_entries: usize,

    /// When set, equipping into a slot flagged unavailable is declined.
    pub enforce_slot_availability: bool,
}

impl InventoryConfig {
    // ===== runtime-tunable defaults =====
    pub const DEFAULT_MAX_DELTA_ENTRIES: usize = 256;
    pub const DEFAULT_ENFORCE_SLOT_AVAILABILITY: bool = true;

    pub fn new() -> Self {
        Self {
            max_delta_entries: Self::DEFAULT_MAX_DELTA_ENTRIES,
            enforce_slot_availability: Self::DEFAULT_ENFORCE_SLOT_AVAILABILITY,
        }
    }

    #[must_use]
    pub fn with_max_delta_entries(mut self, max_delta_entries: usize) -> Self {
        self.max_delta_entries = max_delta_entries.max(1);
        self
    }

    #[must_use]
    pub fn with_slot_availability_enforced(mut self, enforce: bool) -> Self {
        self.enforce_slot_availability = enforce;
        self
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self::new()
    }
}
