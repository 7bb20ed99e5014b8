//! Register-level access shared by all drivers: raw reads and writes,
//! masked flags, and the bounds-checked scratch RAM window.

/// One or more bits inside a control or status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flag {
  pub register: u8,
  pub mask: u8,
}

impl Flag {
  pub const fn new(register: u8, mask: u8) -> Self {
    Flag { register, mask }
  }
}

/// Computes the register value that puts the `mask` bits of `current`
/// into the requested state.
/// Returns the new value, and whether it differs from `current` in the
/// masked bits (ie whether a write is needed at all).
pub const fn update_bits(current: u8, mask: u8, on: bool) -> (u8, bool) {
  let target = if on { mask } else { 0 };
  if current & mask == target {
    (current, false)
  } else {
    ((current & !mask) | target, true)
  }
}

/// Single-register access to a device register file
pub trait Registers {
  /// Error type of the underlying bus or pins
  type Error;

  /// Read one register
  fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error>;

  /// Write one register
  fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error>;

  /// True when every bit of the flag's mask is set
  fn flag(&mut self, flag: Flag) -> Result<bool, Self::Error> {
    let reg_val = self.read_register(flag.register)?;
    Ok(reg_val & flag.mask == flag.mask)
  }

  /// Set (`on`) or clear the flag's bits.
  /// The register is written only if the masked bits actually change,
  /// so adjacent status bits that the device updates are left alone.
  fn set_flag(&mut self, flag: Flag, on: bool) -> Result<(), Self::Error> {
    let current = self.read_register(flag.register)?;
    let (reg_val, changed) = update_bits(current, flag.mask, on);
    if changed {
      self.write_register(flag.register, reg_val)?;
    }
    Ok(())
  }
}

/// General purpose battery-backed RAM exposed through the register file
pub trait ScratchRam: Registers {
  /// Number of RAM bytes
  const RAM_SIZE: u8;

  /// Value returned when reading past the end of RAM
  const OUT_OF_RANGE: u8;

  /// Register holding RAM byte `index` (`index` is already bounds-checked)
  fn ram_register(index: u8) -> u8;

  /// Read RAM byte `index`; out of range indices read as `OUT_OF_RANGE`
  /// without touching the bus
  fn ram(&mut self, index: u8) -> Result<u8, Self::Error> {
    if index >= Self::RAM_SIZE {
      return Ok(Self::OUT_OF_RANGE);
    }
    self.read_register(Self::ram_register(index))
  }

  /// Write RAM byte `index`; out of range indices are ignored
  fn set_ram(&mut self, index: u8, value: u8) -> Result<(), Self::Error> {
    if index >= Self::RAM_SIZE {
      return Ok(());
    }
    self.write_register(Self::ram_register(index), value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // Plain register file that records every write
  struct RegFile {
    regs: [u8; 8],
    reads: usize,
    writes: Vec<(u8, u8)>,
  }

  impl RegFile {
    fn new() -> Self {
      RegFile { regs: [0; 8], reads: 0, writes: Vec::new() }
    }
  }

  impl Registers for RegFile {
    type Error = ();

    fn read_register(&mut self, reg: u8) -> Result<u8, ()> {
      self.reads += 1;
      Ok(self.regs[reg as usize])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), ()> {
      self.writes.push((reg, value));
      self.regs[reg as usize] = value;
      Ok(())
    }
  }

  impl ScratchRam for RegFile {
    const RAM_SIZE: u8 = 4;
    const OUT_OF_RANGE: u8 = 0xFF;

    fn ram_register(index: u8) -> u8 {
      4 + index
    }
  }

  #[test]
  fn update_bits_reports_changes() {
    assert_eq!(update_bits(0b1010_0000, 0b1000_0000, true), (0b1010_0000, false));
    assert_eq!(update_bits(0b1010_0000, 0b1000_0000, false), (0b0010_0000, true));
    assert_eq!(update_bits(0b0000_0001, 0b0000_0110, true), (0b0000_0111, true));
    // partially set multi-bit masks count as a change
    assert_eq!(update_bits(0b0000_0010, 0b0000_0110, true), (0b0000_0110, true));
    assert_eq!(update_bits(0b0000_0010, 0b0000_0110, false), (0b0000_0000, true));
  }

  #[test]
  fn set_flag_skips_redundant_writes() {
    let mut rf = RegFile::new();
    rf.regs[2] = 0x81;
    rf.set_flag(Flag::new(2, 0x80), true).unwrap();
    rf.set_flag(Flag::new(2, 0x40), false).unwrap();
    assert_eq!(rf.reads, 2);
    assert!(rf.writes.is_empty());
  }

  #[test]
  fn set_flag_preserves_other_bits() {
    let mut rf = RegFile::new();
    rf.regs[1] = 0x0F;
    rf.set_flag(Flag::new(1, 0x01), false).unwrap();
    rf.set_flag(Flag::new(1, 0x80), true).unwrap();
    assert_eq!(rf.writes, vec![(1, 0x0E), (1, 0x8E)]);
    assert!(rf.flag(Flag::new(1, 0x80)).unwrap());
    assert!(!rf.flag(Flag::new(1, 0x81)).unwrap());
  }

  #[test]
  fn ram_window_bounds() {
    let mut rf = RegFile::new();
    rf.set_ram(0, 0x11).unwrap();
    rf.set_ram(3, 0x33).unwrap();
    assert_eq!(rf.writes, vec![(4, 0x11), (7, 0x33)]);

    let reads_before = rf.reads;
    assert_eq!(rf.ram(RegFile::RAM_SIZE).unwrap(), 0xFF);
    rf.set_ram(RegFile::RAM_SIZE, 0x44).unwrap();
    assert_eq!(rf.reads, reads_before);
    assert_eq!(rf.writes.len(), 2);

    assert_eq!(rf.ram(0).unwrap(), 0x11);
    assert_eq!(rf.ram(3).unwrap(), 0x33);
  }
}
