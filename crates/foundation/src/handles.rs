/// Generational handle: (slot, generation).
///
/// A slot is reused for every resource created in the same place; the
/// generation tells successive occupants apart.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId {
    slot: u32,
    generation: u32,
}

impl HandleId {
    pub fn slot(self) -> u32 {
        self.slot
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}.{}", self.slot, self.generation)
    }
}

/// Hands out [`HandleId`]s per slot, bumping the generation on every issue.
#[derive(Debug, Default, Clone)]
pub struct HandleAllocator {
    generations: Vec<u32>,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a new slot. Its first issued handle has generation 1.
    pub fn add_slot(&mut self) -> u32 {
        self.generations.push(0);
        (self.generations.len() - 1) as u32
    }

    pub fn slot_count(&self) -> usize {
        self.generations.len()
    }

    /// Issue the next handle for `slot`. Returns `None` for unknown slots.
    pub fn issue(&mut self, slot: u32) -> Option<HandleId> {
        let generation = self.generations.get_mut(slot as usize)?;
        *generation = generation.wrapping_add(1);
        Some(HandleId {
            slot,
            generation: *generation,
        })
    }

    /// True if `id` is the most recently issued handle of its slot.
    pub fn is_current(&self, id: HandleId) -> bool {
        self.generations.get(id.slot as usize).copied() == Some(id.generation)
    }
}
