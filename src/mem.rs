use std::fmt;

/// Number of addressable cells: the full 16-bit address space.
pub const WORD_COUNT: usize = u16::MAX as usize + 1;

/// Keyboard status register: bit 15 set while a key is pending.
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register: the last key read by a status poll.
pub const KBDR: u16 = 0xFE02;

/// Flat word-addressed storage for both code and data. Every address is
/// valid; the u16 address type makes wraparound modulo 65536 inherent.
pub struct Memory {
    cells: Box<[u16]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            cells: vec![0; WORD_COUNT].into_boxed_slice(),
        }
    }

    pub fn read(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    pub fn write(&mut self, addr: u16, data: u16) {
        self.cells[addr as usize] = data;
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("words", &WORD_COUNT)
            .finish_non_exhaustive()
    }
}
