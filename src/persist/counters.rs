use memmap2::MmapMut;
use std::ops::{Deref, DerefMut};

/// A zero-initialized `u64` counter array.
///
/// Preferred backing is an anonymous mapping with huge-page advice, pinned
/// so the hot write path cannot fault under sustained packet rates; the
/// backing is invisible to callers and falls back to the heap when the
/// mapping cannot be created.
pub(crate) struct CounterArray {
    backing: Backing,
}

enum Backing {
    Mapped(MmapMut),
    Heap(Box<[u64]>),
}

impl CounterArray {
    pub(crate) fn new(len: usize) -> Self {
        let backing = match MmapMut::map_anon(len * size_of::<u64>()) {
            Ok(map) => {
                #[cfg(target_os = "linux")]
                unsafe {
                    let ptr = map.as_ptr() as *mut libc::c_void;
                    // Best effort on both: the array works either way.
                    libc::madvise(ptr, map.len(), libc::MADV_HUGEPAGE);
                    libc::mlock(ptr, map.len());
                }
                Backing::Mapped(map)
            }
            Err(_) => Backing::Heap(vec![0u64; len].into_boxed_slice()),
        };
        Self { backing }
    }
}

impl Deref for CounterArray {
    type Target = [u64];

    fn deref(&self) -> &[u64] {
        match &self.backing {
            Backing::Mapped(map) => bytemuck::cast_slice(&map[..]),
            Backing::Heap(counters) => counters,
        }
    }
}

impl DerefMut for CounterArray {
    fn deref_mut(&mut self) -> &mut [u64] {
        match &mut self.backing {
            Backing::Mapped(map) => bytemuck::cast_slice_mut(&mut map[..]),
            Backing::Heap(counters) => counters,
        }
    }
}
