//! Sparse memory image shared by the bus ports.
//!
//! Memory is stored as 8-byte words keyed by their aligned address. Words that
//! were never written resolve to the image's default word instead of random
//! data, so a core fetching from unbacked memory behaves deterministically.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

/// Two RISC-V `wfi` instructions. Fetching unbacked memory parks the core.
pub const PARKED_WORD: u64 = 0x1050_0073_1050_0073;

/// Align `addr` down to the 8-byte word containing it.
pub fn word_addr(addr: u64) -> u64 {
    addr & !7
}

/// Expand a byte strobe into a 64-bit mask, one `0xff` per enabled lane.
pub fn strobe_mask(strobe: u8) -> u64 {
    (0..8)
        .filter(|lane| strobe >> lane & 1 != 0)
        .fold(0, |mask, lane| mask | 0xff << (lane * 8))
}

/// Word-granular sparse memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    words: BTreeMap<u64, u64>,
    default: u64,
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new(PARKED_WORD)
    }
}

impl MemoryImage {
    /// An empty image whose unbacked words read as `default`.
    pub fn new(default: u64) -> Self {
        Self {
            words: BTreeMap::new(),
            default,
        }
    }

    pub fn default_word(&self) -> u64 {
        self.default
    }

    /// The stored word containing `addr`, if it was ever written.
    pub fn get(&self, addr: u64) -> Option<u64> {
        self.words.get(&word_addr(addr)).copied()
    }

    /// The word containing `addr`, falling back to the default word.
    pub fn read(&self, addr: u64) -> u64 {
        self.get(addr).unwrap_or(self.default)
    }

    /// Merge the strobed byte lanes of `data` into the word containing
    /// `addr`. Lanes outside `strobe` keep the value a read would return.
    pub fn write(&mut self, addr: u64, data: u64, strobe: u8) {
        self.write_over(addr, data, strobe, self.default)
    }

    /// Like [`MemoryImage::write`], but lanes of a fresh word that `strobe`
    /// leaves out start as `base` instead of the default word.
    pub fn write_over(&mut self, addr: u64, data: u64, strobe: u8, base: u64) {
        if strobe == 0 {
            return;
        }
        let mask = strobe_mask(strobe);
        let slot = self.words.entry(word_addr(addr)).or_insert(base);
        *slot = (*slot & !mask) | (data & mask);
    }

    /// Store a single byte. Bytes of a fresh word that are not written read
    /// as zero, which is what a zero-filled segment expects.
    pub fn write_byte(&mut self, addr: u64, byte: u8) {
        let shift = (addr % 8) * 8;
        let slot = self.words.entry(word_addr(addr)).or_insert(0);
        *slot &= !(0xff << shift);
        *slot |= (byte as u64) << shift;
    }

    /// Number of backed words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Backed words in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.words.iter().map(|(addr, word)| (*addr, *word))
    }

    pub fn into_shared(self) -> SharedMemory {
        Rc::new(RefCell::new(self))
    }
}

/// A memory image shared between the ports of one simulation.
pub type SharedMemory = Rc<RefCell<MemoryImage>>;

/// Storage a bus port reads from and writes to.
///
/// Addresses handed to the backing are byte addresses of the current beat;
/// data is always the full 64-bit bus word with `strobe` selecting the valid
/// lanes.
pub trait Backing {
    fn read(&mut self, addr: u64) -> u64;
    fn write(&mut self, addr: u64, data: u64, strobe: u8);
}

impl Backing for MemoryImage {
    fn read(&mut self, addr: u64) -> u64 {
        MemoryImage::read(self, addr)
    }

    fn write(&mut self, addr: u64, data: u64, strobe: u8) {
        MemoryImage::write(self, addr, data, strobe)
    }
}

impl Backing for SharedMemory {
    fn read(&mut self, addr: u64) -> u64 {
        self.borrow().read(addr)
    }

    fn write(&mut self, addr: u64, data: u64, strobe: u8) {
        self.borrow_mut().write(addr, data, strobe)
    }
}

/// Backing for a port with nothing attached: every read returns the parked
/// word and writes vanish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unbacked {
    pub parked: u64,
}

impl Default for Unbacked {
    fn default() -> Self {
        Self {
            parked: PARKED_WORD,
        }
    }
}

impl Backing for Unbacked {
    fn read(&mut self, _addr: u64) -> u64 {
        self.parked
    }

    fn write(&mut self, _addr: u64, _data: u64, _strobe: u8) {}
}
