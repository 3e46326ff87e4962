//! Host-control protocol on the MMIO bus.
//!
//! The simulated program talks to the harness through a few memory-mapped
//! words, following the usual `tohost`/`fromhost` convention:
//!
//! - writing [`EXIT_SUCCESS`] to `tohost` ends the run successfully,
//! - writing [`SYS_WRITE`] to `tohost` prints the NUL-terminated string held
//!   in the output buffer,
//! - `fromhost` always reads as all ones, which releases a core that spins
//!   until the harness answers.

use std::io::Write;

use crate::mem::{word_addr, Backing, SharedMemory};

/// Default address of the `tohost` completion register.
pub const TOHOST_ADDR: u64 = 0x6000_0000;
pub const FROMHOST_OFFSET: u64 = 0x40;
pub const BUFFER_OFFSET: u64 = 0x80;
/// Size of the output buffer in bytes, a whole number of words.
pub const BUFFER_SIZE: u64 = 64;

/// `tohost` value reported by a program whose `main` returned zero.
pub const EXIT_SUCCESS: u64 = 1;
/// `tohost` value asking the harness to print the output buffer.
pub const SYS_WRITE: u64 = 64;
/// What every read of `fromhost` returns.
pub const FROMHOST_VALUE: u64 = u64::MAX;

/// Where the host-control registers live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLayout {
    pub tohost: u64,
    pub fromhost: u64,
    pub buffer: u64,
    pub buffer_size: u64,
}

impl HostLayout {
    /// The standard layout relative to a `tohost` register at `tohost`.
    pub fn at(tohost: u64) -> Self {
        Self {
            tohost,
            fromhost: tohost + FROMHOST_OFFSET,
            buffer: tohost + BUFFER_OFFSET,
            buffer_size: BUFFER_SIZE,
        }
    }
}

impl Default for HostLayout {
    fn default() -> Self {
        Self::at(TOHOST_ADDR)
    }
}

/// Memory backing of the MMIO bus that interprets host-control writes.
pub struct HostControl<W> {
    memory: SharedMemory,
    layout: HostLayout,
    console: W,
    finished: bool,
}

impl<W: Write> HostControl<W> {
    pub fn new(memory: SharedMemory, layout: HostLayout, console: W) -> Self {
        Self {
            memory,
            layout,
            console,
            finished: false,
        }
    }

    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    /// Whether the program reported success.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn console(&self) -> &W {
        &self.console
    }

    pub fn into_console(self) -> W {
        self.console
    }

    /// The bytes of the output buffer up to, not including, the first NUL.
    /// Words never written count as zero.
    pub fn buffer_contents(&self) -> Vec<u8> {
        let memory = self.memory.borrow();
        let mut bytes = Vec::new();
        for offset in (0..self.layout.buffer_size).step_by(8) {
            let word = memory.get(self.layout.buffer + offset).unwrap_or(0);
            for byte in word.to_le_bytes() {
                if byte == 0 {
                    return bytes;
                }
                bytes.push(byte);
            }
        }
        bytes
    }

    /// Copy the output buffer to the console. Returns the number of bytes
    /// printed.
    pub fn drain(&mut self) -> usize {
        let bytes = self.buffer_contents();
        let written = self
            .console
            .write_all(&bytes)
            .and_then(|_| self.console.flush());
        if let Err(err) = written {
            tracing::warn!("failed to write program output to console: {err}");
        }
        bytes.len()
    }

    fn on_tohost(&mut self, value: u64) {
        match value {
            EXIT_SUCCESS => {
                tracing::info!("program reported success");
                self.finished = true;
            }
            SYS_WRITE => {
                let n = self.drain();
                tracing::trace!("drained {n} byte(s) of program output");
            }
            other => tracing::debug!("ignoring tohost value {other:#x}"),
        }
    }
}

impl<W: Write> Backing for HostControl<W> {
    fn read(&mut self, addr: u64) -> u64 {
        if word_addr(addr) == word_addr(self.layout.fromhost) {
            FROMHOST_VALUE
        } else {
            self.memory.borrow().read(addr)
        }
    }

    /// Host-control words start out as zero, so a narrow store sees only the
    /// bytes it wrote.
    fn write(&mut self, addr: u64, data: u64, strobe: u8) {
        self.memory.borrow_mut().write_over(addr, data, strobe, 0);
        if word_addr(addr) == word_addr(self.layout.tohost) {
            let value = self.memory.borrow().read(addr);
            self.on_tohost(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemoryImage, PARKED_WORD};

    fn host() -> HostControl<Vec<u8>> {
        HostControl::new(
            MemoryImage::default().into_shared(),
            HostLayout::default(),
            Vec::new(),
        )
    }

    fn put_str(host: &mut HostControl<Vec<u8>>, s: &[u8]) {
        let base = host.layout().buffer;
        for (i, chunk) in s.chunks(8).enumerate() {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            host.write(base + 8 * i as u64, u64::from_le_bytes(word), 0xff);
        }
    }

    #[test]
    fn test_layout() {
        let layout = HostLayout::default();
        assert_eq!(layout.tohost, 0x6000_0000);
        assert_eq!(layout.fromhost, 0x6000_0040);
        assert_eq!(layout.buffer, 0x6000_0080);
        assert_eq!(layout.buffer_size, 64);
    }

    #[test]
    fn test_success() {
        let mut host = host();
        host.write(TOHOST_ADDR, 2, 0xff);
        assert!(!host.is_finished());
        host.write(TOHOST_ADDR, EXIT_SUCCESS, 0xff);
        assert!(host.is_finished());
        assert!(host.console().is_empty());
    }

    #[test]
    fn test_fromhost_stub() {
        let mut host = host();
        host.write(TOHOST_ADDR + FROMHOST_OFFSET, 0, 0xff);
        assert_eq!(host.read(TOHOST_ADDR + FROMHOST_OFFSET), FROMHOST_VALUE);
        assert_eq!(host.read(TOHOST_ADDR + FROMHOST_OFFSET + 4), FROMHOST_VALUE);
        // other registers read through to memory
        assert_eq!(host.read(TOHOST_ADDR + 0x48), PARKED_WORD);
        host.write(TOHOST_ADDR + 0x48, 5, 0xff);
        assert_eq!(host.read(TOHOST_ADDR + 0x48), 5);
    }

    #[test]
    fn test_drain_stops_at_nul() {
        let mut host = host();
        put_str(&mut host, b"hello, world\n\0garbage");
        host.write(TOHOST_ADDR, SYS_WRITE, 0xff);
        assert_eq!(host.console().as_slice(), b"hello, world\n");
        assert!(!host.is_finished());
    }

    #[test]
    fn test_drain_nul_at_offset() {
        for k in 0..12usize {
            let mut host = host();
            let mut s = vec![b'x'; 16];
            s[k] = 0;
            put_str(&mut host, &s);
            assert_eq!(host.drain(), k);
            assert_eq!(host.console().len(), k);
        }
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut host = host();
        put_str(&mut host, b"abc\0");
        host.write(TOHOST_ADDR, SYS_WRITE, 0xff);
        host.write(TOHOST_ADDR, SYS_WRITE, 0xff);
        assert_eq!(host.into_console(), b"abcabc".to_vec());
    }

    #[test]
    fn test_drain_full_window() {
        let mut host = host();
        let s = [b'z'; 80];
        put_str(&mut host, &s);
        assert_eq!(host.drain(), 64);
    }

    #[test]
    fn test_narrow_tohost_write() {
        let mut host = host();
        host.write(TOHOST_ADDR, EXIT_SUCCESS, 0x0f);
        assert!(host.is_finished());

        let mut host = self::host();
        host.write(TOHOST_ADDR, SYS_WRITE, 0x01);
        assert!(!host.is_finished());
        host.write(TOHOST_ADDR, 0, 0x01);
        host.write(TOHOST_ADDR + 4, 0xdead_0000_0000, 0x30);
        assert!(!host.is_finished());
        host.write(TOHOST_ADDR, 0, 0x30);
        host.write(TOHOST_ADDR, EXIT_SUCCESS, 0x01);
        assert!(host.is_finished());
    }

    #[test]
    fn test_drain_bytewise_buffer() {
        let mut host = host();
        let base = host.layout().buffer;
        for (i, byte) in b"hi".iter().enumerate() {
            host.write(base + i as u64, (*byte as u64) << (8 * i), 1 << i);
        }
        host.write(TOHOST_ADDR, SYS_WRITE, 0xff);
        assert_eq!(host.console().as_slice(), b"hi");
    }

    #[test]
    fn test_drain_unwritten_buffer_is_empty() {
        let mut host = host();
        assert_eq!(host.drain(), 0);
    }
}
