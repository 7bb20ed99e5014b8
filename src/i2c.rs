//! Register transport for the I2C chips, with optional i2c mux support

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

/// Most data bytes one burst write carries
pub const MAX_BURST_DATA: usize = 16;

// Rejects oversized bursts at compile time
struct BurstLen<const N: usize>;

impl<const N: usize> BurstLen<N> {
  const CHECKED: () = assert!(N <= MAX_BURST_DATA, "i2c burst longer than MAX_BURST_DATA");
}

/// Register transport for an I2C RTC at a fixed 7-bit address,
/// optionally reached through an i2c mux.
pub struct I2cRegisters<I2C> {
  i2c: I2C,
  address: u8,
  mux_addr: u8,
  mux_chan: u8,
}

impl<I2C, E> I2cRegisters<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  /// Transport with no i2c mux between the RTC and the host
  pub fn new(i2c: I2C, address: u8) -> Self {
    I2cRegisters {
      i2c,
      address,
      mux_addr: 0u8,
      mux_chan: 0u8,
    }
  }

  /// Transport with an i2c mux between the RTC and the host.
  /// - `mux_addr` : the i2c address of the mux itself
  /// - `mux_chan` : the mux channel assigned to the RTC
  pub fn new_with_mux(i2c: I2C, address: u8, mux_addr: u8, mux_chan: u8) -> Self {
    I2cRegisters {
      i2c,
      address,
      mux_addr,
      mux_chan,
    }
  }

  /// Give the bus back to the caller
  pub fn release(self) -> I2C {
    self.i2c
  }

  // If using an i2c mux, tell the mux to select our channel
  fn select_mux_channel(&mut self) -> Result<(), E> {
    if self.mux_addr != 0u8 {
      self.i2c.write(self.mux_addr, &[self.mux_chan])
    } else {
      Ok(())
    }
  }

  /// Whether the device acknowledges a read of `reg`
  pub fn probe(&mut self, reg: u8) -> bool {
    self.read_register(reg).is_ok()
  }

  pub fn read_register(&mut self, reg: u8) -> Result<u8, E> {
    self.select_mux_channel()?;
    let mut buf = [0];
    self.i2c.write_read(self.address, &[reg], &mut buf)?;
    Ok(buf[0])
  }

  pub fn write_register(&mut self, reg: u8, data: u8) -> Result<(), E> {
    self.select_mux_channel()?;
    self.i2c.write(self.address, &[reg, data])
  }

  /// Read consecutive registers starting at `reg`, in one transaction
  pub fn read_burst(&mut self, reg: u8, read_buf: &mut [u8]) -> Result<(), E> {
    self.select_mux_channel()?;
    self.i2c.write_read(self.address, &[reg], read_buf)
  }

  /// Write consecutive registers starting at `reg`, in one transaction.
  /// Bursts longer than `MAX_BURST_DATA` do not compile.
  pub fn write_burst<const N: usize>(&mut self, reg: u8, data: &[u8; N]) -> Result<(), E> {
    #[allow(clippy::let_unit_value)]
    let () = BurstLen::<N>::CHECKED;
    self.select_mux_channel()?;
    let mut buf = [0u8; MAX_BURST_DATA + 1];
    buf[0] = reg;
    buf[1..=N].copy_from_slice(data);
    self.i2c.write(self.address, &buf[..=N])
  }
}
