//! Decompressed chunk cache
//!
//! Reads against a compressed package go through a [`ChunkCache`]. The
//! default [`SingleChunkCache`] keeps exactly one decompressed chunk
//! resident; storing another evicts it.

/// Storage for decompressed chunks, keyed by chunk index
pub trait ChunkCache: Send {
    /// Decompressed bytes of a chunk, if resident
    fn lookup(&self, chunk: usize) -> Option<&[u8]>;

    /// Make a freshly decompressed chunk resident
    fn store(&mut self, chunk: usize, data: Vec<u8>);

    /// Drop every resident chunk
    fn clear(&mut self);

    /// Index of the resident chunk, if any
    fn resident(&self) -> Option<usize>;

    /// Number of chunks stored since the cache was created
    fn load_count(&self) -> usize;
}

/// Cache holding a single decompressed chunk
#[derive(Debug, Default)]
pub struct SingleChunkCache {
    current: Option<(usize, Vec<u8>)>,
    loads: usize,
}

impl SingleChunkCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkCache for SingleChunkCache {
    fn lookup(&self, chunk: usize) -> Option<&[u8]> {
        match &self.current {
            Some((index, data)) if *index == chunk => Some(data.as_slice()),
            _ => None,
        }
    }

    fn store(&mut self, chunk: usize, data: Vec<u8>) {
        self.loads += 1;
        self.current = Some((chunk, data));
    }

    fn clear(&mut self) {
        self.current = None;
    }

    fn resident(&self) -> Option<usize> {
        self.current.as_ref().map(|(index, _)| *index)
    }

    fn load_count(&self) -> usize {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_slot_evicts() {
        let mut cache = SingleChunkCache::new();
        assert!(cache.lookup(0).is_none());

        cache.store(0, vec![1, 2, 3]);
        assert_eq!(cache.lookup(0), Some(&[1u8, 2, 3][..]));
        assert_eq!(cache.resident(), Some(0));

        cache.store(4, vec![9]);
        assert!(cache.lookup(0).is_none());
        assert_eq!(cache.lookup(4), Some(&[9u8][..]));
        assert_eq!(cache.load_count(), 2);

        cache.clear();
        assert_eq!(cache.resident(), None);
        assert_eq!(cache.load_count(), 2);
    }
}
