//! Binary coded decimal conversion shared by every chip.
//!
//! Neither direction validates its input: a nibble above 9 decodes to
//! whatever the arithmetic yields. The chips never emit such values.

/// Converts a BCD register value (two digits, 00..99) to binary
pub const fn decode(value: u8) -> u8 {
  value - 6 * (value >> 4)
}

/// Converts a binary value (0..99) to BCD
pub const fn encode(value: u8) -> u8 {
  value.wrapping_add(6 * (value / 10))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_known_values() {
    assert_eq!(decode(0x00), 0);
    assert_eq!(decode(0x09), 9);
    assert_eq!(decode(0x10), 10);
    assert_eq!(decode(0x59), 59);
    assert_eq!(decode(0x99), 99);
  }

  #[test]
  fn encode_known_values() {
    assert_eq!(encode(0), 0x00);
    assert_eq!(encode(7), 0x07);
    assert_eq!(encode(23), 0x23);
    assert_eq!(encode(99), 0x99);
  }

  #[test]
  fn every_decimal_survives_encoding() {
    for v in 0..=99u8 {
      assert_eq!(decode(encode(v)), v, "value {}", v);
    }
  }

  #[test]
  fn malformed_nibbles_are_not_rejected() {
    // 0x1A is not BCD; the arithmetic result is kept as-is
    assert_eq!(decode(0x1A), 0x1A - 6);
  }
}
