//! Place the loadable segments of an ELF executable into a memory image.

use std::path::Path;

use anyhow::{anyhow, Context};
use object::{
    elf::{FileHeader32, FileHeader64, PT_LOAD},
    read::elf::{FileHeader, ProgramHeader},
    Endianness, FileKind, Object, ObjectSymbol,
};

use crate::mem::MemoryImage;

/// Symbol whose address is the host-control base.
pub const TOHOST_SYMBOL: &str = "tohost";

/// What [`load_elf`] found in the executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedElf {
    pub entry: u64,
    /// Loaded segments as `(paddr, memsz)`.
    pub segments: Vec<(u64, u64)>,
    /// Bytes written, zero fill included.
    pub bytes: u64,
    /// Address of the `tohost` symbol, if the binary defines one.
    pub tohost: Option<u64>,
}

fn load_segments<Elf: FileHeader<Endian = Endianness>>(
    data: &[u8],
    mem: &mut MemoryImage,
) -> anyhow::Result<(u64, Vec<(u64, u64)>)> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let mut segments = Vec::new();
    for ph in header.program_headers(endian, data)? {
        if ph.p_type(endian) != PT_LOAD {
            continue;
        }
        let memsz: u64 = ph.p_memsz(endian).into();
        if memsz == 0 {
            continue;
        }
        let paddr: u64 = ph.p_paddr(endian).into();
        let file = ph
            .data(endian, data)
            .map_err(|()| anyhow!("segment at {paddr:#x} lies outside the file"))?;
        tracing::info!(
            "loading segment at {paddr:#x}: {} byte(s) from file, {memsz} in memory",
            file.len()
        );
        let fill = memsz.saturating_sub(file.len() as u64);
        let bytes = file
            .iter()
            .copied()
            .chain(std::iter::repeat(0).take(fill as usize));
        for (offset, byte) in (0u64..).zip(bytes) {
            mem.write_byte(paddr.wrapping_add(offset), byte);
        }
        segments.push((paddr, memsz));
    }
    Ok((header.e_entry(endian).into(), segments))
}

/// Load an ELF image held in memory.
pub fn load_elf_bytes(data: &[u8], mem: &mut MemoryImage) -> anyhow::Result<LoadedElf> {
    let (entry, segments) = match FileKind::parse(data)? {
        FileKind::Elf32 => load_segments::<FileHeader32<Endianness>>(data, mem)?,
        FileKind::Elf64 => load_segments::<FileHeader64<Endianness>>(data, mem)?,
        kind => anyhow::bail!("not an ELF executable: {kind:?}"),
    };
    let file = object::File::parse(data)?;
    let tohost = file
        .symbols()
        .find(|sym| sym.name().map_or(false, |name| name == TOHOST_SYMBOL))
        .map(|sym| sym.address());
    let bytes: u64 = segments.iter().map(|(_, size)| size).sum();
    tracing::info!("entry point {entry:#x}, {bytes} byte(s) loaded");
    if let Some(addr) = tohost {
        tracing::debug!("found {TOHOST_SYMBOL} at {addr:#x}");
    }
    Ok(LoadedElf {
        entry,
        segments,
        bytes,
        tohost,
    })
}

/// Load the ELF executable at `path`.
pub fn load_elf(path: impl AsRef<Path>, mem: &mut MemoryImage) -> anyhow::Result<LoadedElf> {
    let path = path.as_ref();
    let data = std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    load_elf_bytes(&data, mem).with_context(|| format!("could not load {}", path.display()))
}
