//! [MODULE D, part 3] Width adaptation for a fixed byte string: YARA
//! strings can be matched in their raw (`ascii`) form, interleaved with
//! `0x00` (`wide`, i.e. UTF-16LE), or both (spec.md §4.D).

/// Interleave a `0x00` after every byte, matching `yarautil.py::mkwide`.
pub fn widen(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(b);
        out.push(0);
    }
    out
}

#[cfg(test)]
#[path = "fixedstrings_tests.rs"]
mod tests;
