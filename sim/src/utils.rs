use ansi_term::Colour;

use crate::mem::MemoryImage;

/// Parse a numeric literal: decimal, or hexadecimal with a `0x` prefix.
pub fn parse_literal(s: &str) -> Option<u64> {
    if let Ok(r) = s.parse() {
        return Some(r);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    None
}

fn word_bytes(word: u64) -> String {
    word.to_le_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Words that differ between two memory images, as `(addr, before, after)`
/// in address order. Words missing on one side compare as that side's
/// default word.
pub fn changed_words(left: &MemoryImage, right: &MemoryImage) -> Vec<(u64, u64, u64)> {
    let mut addrs: Vec<u64> = left.iter().chain(right.iter()).map(|(a, _)| a).collect();
    addrs.sort_unstable();
    addrs.dedup();
    addrs
        .into_iter()
        .filter_map(|addr| {
            let (l, r) = (left.read(addr), right.read(addr));
            (l != r).then_some((addr, l, r))
        })
        .collect()
}

/// Print the words that changed between `left` and `right`, bytes in memory
/// order.
pub fn mem_diff(left: &MemoryImage, right: &MemoryImage) {
    for (addr, l, r) in changed_words(left, right) {
        println!(
            "{:#010x}: {} -> {}",
            addr,
            Colour::Red.paint(word_bytes(l)),
            Colour::Green.paint(word_bytes(r))
        );
    }
}
