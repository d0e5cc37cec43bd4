//! Bit-level helpers: 21-bit packed motion triples and extension payload
//! obfuscation.

use crate::cursor::OutOfRange;

/// Width of one packed motion component.
pub const PACKED_BITS: u32 = 21;

const PACKED_MASK: u32 = (1 << PACKED_BITS) - 1;

/// Size of one motion-sensor sample block.
pub const MOTION_BLOCK_LEN: usize = 16;

/// Sign-extend the low 21 bits of `v`.
pub fn sign_extend_21(v: u32) -> i32 {
    (((v & PACKED_MASK) << 11) as i32) >> 11
}

/// Unpack three signed 21-bit components from an 8-byte window.
///
/// Components are stored big-endian and back to back: x in bits 63..43,
/// y in 42..22, z in 21..1; bit 0 is unused.
pub fn unpack_triple(b: &[u8; 8]) -> [i32; 3] {
    let x = u32::from_be_bytes([0, b[0], b[1], b[2]]) >> 3;
    let y = u32::from_be_bytes([b[2], b[3], b[4], b[5]]) >> 6;
    let z = u32::from_be_bytes([0, b[5], b[6], b[7]]) >> 1;
    [sign_extend_21(x), sign_extend_21(y), sign_extend_21(z)]
}

/// Inverse of [`unpack_triple`]; components are truncated to 21 bits.
pub fn pack_triple(v: [i32; 3]) -> [u8; 8] {
    let [x, y, z] = v.map(|c| (c as u32) & PACKED_MASK);
    let word: u64 = (u64::from(x) << 43) | (u64::from(y) << 22) | (u64::from(z) << 1);
    word.to_be_bytes()
}

/// Raw accelerometer and gyro triples of one motion-sensor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionSample {
    pub accel: [i32; 3],
    pub gyro: [i32; 3],
}

impl MotionSample {
    pub fn decode(block: &[u8]) -> Result<Self, OutOfRange> {
        let out_of_range = OutOfRange {
            offset: 0,
            wanted: MOTION_BLOCK_LEN,
            len: block.len(),
        };
        let accel: &[u8; 8] = block
            .get(0..8)
            .and_then(|s| s.try_into().ok())
            .ok_or(out_of_range)?;
        let gyro: &[u8; 8] = block
            .get(8..16)
            .and_then(|s| s.try_into().ok())
            .ok_or(out_of_range)?;
        Ok(Self {
            accel: unpack_triple(accel),
            gyro: unpack_triple(gyro),
        })
    }

    pub fn encode(&self) -> [u8; MOTION_BLOCK_LEN] {
        let mut out = [0u8; MOTION_BLOCK_LEN];
        out[..8].copy_from_slice(&pack_triple(self.accel));
        out[8..].copy_from_slice(&pack_triple(self.gyro));
        out
    }
}

/// Key of the extension payload obfuscation.
pub const OBFUSCATION_KEY: u8 = 0x17;

/// Recover one extension byte: `(b ^ 0x17) + 0x17`, wrapping.
pub fn deobfuscate(b: u8) -> u8 {
    (b ^ OBFUSCATION_KEY).wrapping_add(OBFUSCATION_KEY)
}

/// Exact inverse of [`deobfuscate`].
///
/// Not the same function: applying `deobfuscate` twice only returns the
/// input for a handful of bytes.
pub fn obfuscate(b: u8) -> u8 {
    b.wrapping_sub(OBFUSCATION_KEY) ^ OBFUSCATION_KEY
}

pub fn deobfuscate_in_place(payload: &mut [u8]) {
    for b in payload {
        *b = deobfuscate(*b);
    }
}
