//! Binary frame codec for the Galaku wire format
//! Checksum, table-driven stream cipher and command frame assembly.
//! Everything in here is pure and independent of any transport.

use crate::core::error::FrameError;

/// Length of every frame on the wire
pub const FRAME_LEN: usize = 12;

/// Maximum command body length (bytes 1..=10 of a frame)
pub const MAX_BODY_LEN: usize = 10;

/// Sentinel at byte 0 of every assembled frame
pub const FRAME_SENTINEL: u8 = 0x23;

/// Sentinel at byte 0 of a plaintext command body
pub const BODY_SENTINEL: u8 = 0x5A;

/// A 12-byte wire frame
pub type Frame = [u8; FRAME_LEN];

/// A full 10-byte command body
pub type CommandBody = [u8; MAX_BODY_LEN];

/// Vendor cipher key rows, indexed by the low two bits of the previous cipher byte.
const KEY_TABLE: [[u8; FRAME_LEN]; 4] = [
    [0x00, 0x18, 0x98, 0xF7, 0xA5, 0x3D, 0x0D, 0x29, 0x25, 0x50, 0x44, 0x46],
    [0x00, 0x45, 0x6E, 0x6A, 0x6F, 0x78, 0x20, 0x53, 0x2D, 0x31, 0x2E, 0x37],
    [0x00, 0x65, 0x78, 0x20, 0x54, 0x6F, 0x79, 0x73, 0x0A, 0x8E, 0x9D, 0xA3],
    [0x00, 0xC5, 0xD6, 0xE7, 0xF8, 0x0A, 0x32, 0x20, 0x6F, 0x62, 0x0D, 0x0A],
];

/// Sum of the first `n` bytes read as signed 8-bit values, truncated to one byte.
pub fn checksum(buf: &[u8], n: usize) -> u8 {
    buf.iter()
        .take(n)
        .fold(0i8, |acc, &b| acc.wrapping_add(b as i8)) as u8
}

fn table_byte(prev: u8, i: usize) -> u8 {
    KEY_TABLE[(prev & 3) as usize][i]
}

/// Encrypts a plaintext frame. Byte 0 is carried through in the clear.
pub fn encrypt(plain: &Frame) -> Frame {
    let mut cipher = [0u8; FRAME_LEN];
    cipher[0] = plain[0];
    for i in 1..FRAME_LEN {
        let k = table_byte(cipher[i - 1], i);
        cipher[i] = (k ^ plain[0] ^ plain[i]).wrapping_add(k);
    }
    cipher
}

/// Inverse of [`encrypt`].
pub fn decrypt(cipher: &Frame) -> Frame {
    let mut plain = [0u8; FRAME_LEN];
    plain[0] = cipher[0];
    for i in 1..FRAME_LEN {
        let k = table_byte(cipher[i - 1], i);
        plain[i] = k ^ (cipher[i].wrapping_sub(k) ^ cipher[0]);
    }
    plain
}

/// Assembles a full 10-byte body into an encrypted frame.
pub fn assemble_body(body: &CommandBody) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = FRAME_SENTINEL;
    frame[1..=MAX_BODY_LEN].copy_from_slice(body);
    frame[FRAME_LEN - 1] = checksum(&frame, FRAME_LEN - 1);
    encrypt(&frame)
}

/// Assembles a command body of up to 10 bytes into an encrypted frame.
///
/// Bytes past the body are zero-filled up to byte 10; byte 11 is the checksum.
pub fn assemble_command(body: &[u8]) -> Result<Frame, FrameError> {
    if body.is_empty() {
        return Err(FrameError::EmptyBody);
    }
    if body.len() > MAX_BODY_LEN {
        return Err(FrameError::BodyTooLong(body.len()));
    }
    let mut padded = [0u8; MAX_BODY_LEN];
    padded[..body.len()].copy_from_slice(body);
    Ok(assemble_body(&padded))
}

/// Decrypts an inbound notification.
///
/// The cipher covers the first 12 bytes; anything past them is carried through as is.
pub fn decrypt_notification(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let block: &Frame = data
        .get(..FRAME_LEN)
        .and_then(|head| head.try_into().ok())
        .ok_or(FrameError::TooShort(data.len()))?;

    let mut plain = decrypt(block).to_vec();
    plain.extend_from_slice(&data[FRAME_LEN..]);
    Ok(plain)
}
