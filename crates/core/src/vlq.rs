//! Base-128 little-endian VLQ codec for posting-list deltas (spec.md §3).

use sigfilter_runtime::CoreError;

/// Decode a single VLQ-encoded integer from `bytes`, returning the value
/// and the number of bytes consumed.
///
/// `bytes` must contain at least one terminating byte (high bit clear);
/// running out of input mid-integer is a truncated-VLQ corruption error.
pub fn decode_one(bytes: &[u8]) -> Result<(u64, usize), CoreError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;

    for (i, &b) in bytes.iter().enumerate() {
        value |= ((b & 0x7F) as u64) << shift;
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return Err(CoreError::CorruptIndex(
                "VLQ integer exceeds 64 bits".to_string(),
            ));
        }
    }

    Err(CoreError::CorruptIndex(
        "truncated VLQ sequence".to_string(),
    ))
}

/// Decode exactly `count` VLQ-encoded deltas from `bytes`.
pub fn decode_n(bytes: &[u8], count: usize) -> Result<Vec<u64>, CoreError> {
    let mut out = Vec::with_capacity(count);
    let mut pos = 0usize;
    for _ in 0..count {
        let (value, used) = decode_one(&bytes[pos..])?;
        out.push(value);
        pos += used;
    }
    Ok(out)
}

/// Encode `value` as a VLQ byte sequence, appending to `out`.
pub fn encode_into(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
            out.push(byte);
        } else {
            out.push(byte);
            break;
        }
    }
}

#[cfg(test)]
#[path = "vlq_tests.rs"]
mod tests;
