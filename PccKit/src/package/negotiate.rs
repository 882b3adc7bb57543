//! Making room for tables in front of the export data
//!
//! Tables are written right after the header and the export payloads start
//! where the tables end. When a table grows past the first payload, exports
//! are moved (in ascending offset order) to the end of the data until the
//! first remaining payload starts far enough out.
//!
//! Planning is a pure function over an [`ExportLayout`] snapshot; nothing
//! moves until a complete [`RelocationPlan`] exists.

/// Object name of the export that must stay at its offset
pub const SHADER_CACHE_OBJECT: &str = "SeekFreeShaderCache";

/// Class name of the export that must stay at its offset
pub const SHADER_CACHE_CLASS: &str = "ShaderCache";

/// Location of one export's payload in the decompressed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSlot {
    /// Index in the export table
    pub id: usize,
    pub offset: u32,
    pub size: u32,
    /// Never relocated
    pub pinned: bool,
}

impl ExportSlot {
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }
}

/// Payload placement of every export plus the end-of-data watermark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    slots: Vec<ExportSlot>,
    exports_end: u64,
}

impl ExportLayout {
    /// Build a layout from slots indexed by export id
    #[must_use]
    pub fn new(slots: Vec<ExportSlot>, exports_end: u64) -> Self {
        let max_end = slots.iter().map(ExportSlot::end).max().unwrap_or(0);
        Self {
            slots,
            exports_end: exports_end.max(max_end),
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[ExportSlot] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, id: usize) -> Option<&ExportSlot> {
        self.slots.get(id)
    }

    #[must_use]
    pub fn exports_end(&self) -> u64 {
        self.exports_end
    }

    /// Offset of the lowest payload
    #[must_use]
    pub fn first_offset(&self) -> Option<u32> {
        self.slots.iter().map(|s| s.offset).min()
    }

    /// Slots sorted by payload offset, ties broken by export id
    #[must_use]
    pub fn sorted(&self) -> Vec<ExportSlot> {
        let mut sorted = self.slots.clone();
        sorted.sort_by_key(|s| (s.offset, s.id));
        sorted
    }

    /// Move one export's payload to the watermark
    pub fn move_to_end(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.offset = self.exports_end as u32;
            self.exports_end += u64::from(slot.size);
        }
    }

    /// Carry out a plan produced by [`plan_relocation`]
    pub fn apply(&mut self, plan: &RelocationPlan) {
        for &id in &plan.moves {
            self.move_to_end(id);
        }
    }
}

/// Exports to move, in order, to free space in front of the export data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationPlan {
    pub moves: Vec<usize>,
    /// Bytes gained in front of the first remaining payload
    pub freed: u64,
}

/// Find the shortest prefix of exports (by offset) whose relocation frees
/// at least `needed` bytes in front of the export data.
///
/// Returns `None` when no such prefix exists, including when the pinned
/// shader cache would have to move, or when the relocated payloads would no
/// longer fit below 4 GiB.
#[must_use]
pub fn plan_relocation(layout: &ExportLayout, needed: u64) -> Option<RelocationPlan> {
    let sorted = layout.sorted();
    let first = u64::from(sorted.first()?.offset);

    let mut moves = Vec::new();
    let mut watermark = layout.exports_end;
    for (i, slot) in sorted.iter().enumerate() {
        if slot.pinned {
            return None;
        }
        moves.push(slot.id);
        watermark += u64::from(slot.size);
        if watermark > u64::from(u32::MAX) {
            return None;
        }

        // The moved payloads land at the old watermark, which is past every
        // remaining payload
        let next_first = sorted
            .get(i + 1)
            .map_or(layout.exports_end, |s| u64::from(s.offset));
        let freed = next_first - first;
        if freed >= needed {
            return Some(RelocationPlan { moves, freed });
        }
    }
    None
}
