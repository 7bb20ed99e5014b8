//! Bit-banged 3-wire serial transport (CE, SCLK, bidirectional IO), as
//! used by the DS1302. Bytes travel least significant bit first.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

/// A data pin that can switch between driving and sampling the line.
/// embedded-hal 0.2 has no runtime direction change, so HAL pins
/// need a thin wrapper implementing this.
pub trait IoLine: InputPin + OutputPin<Error = <Self as InputPin>::Error> {
  /// Release the line so the device can drive it
  fn set_input(&mut self) -> Result<(), <Self as InputPin>::Error>;

  /// Drive the line from the host
  fn set_output(&mut self) -> Result<(), <Self as InputPin>::Error>;
}

/// Transport delays, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
  /// CE asserted to first clock edge (tCC)
  pub setup_us: u8,
  /// CE inactive time before the next transaction (tCWH)
  pub hold_us: u8,
  /// Wait after each rising SCLK edge (tCH)
  pub settle_us: u8,
}

impl Default for Timing {
  /// Datasheet minimums at 2V supply, rounded up
  fn default() -> Self {
    Timing {
      setup_us: 4,
      hold_us: 4,
      settle_us: 1,
    }
  }
}

/// Owns the three pins and the delay source for the 3-wire bus
pub struct ThreeWire<CE, CLK, IO, D> {
  ce: CE,
  clk: CLK,
  io: IO,
  delay: D,
  timing: Timing,
}

impl<CE, CLK, IO, D, E> ThreeWire<CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  pub fn new(ce: CE, clk: CLK, io: IO, delay: D) -> Self {
    Self::with_timing(ce, clk, io, delay, Timing::default())
  }

  pub fn with_timing(ce: CE, clk: CLK, io: IO, delay: D, timing: Timing) -> Self {
    ThreeWire { ce, clk, io, delay, timing }
  }

  /// Give the pins and delay back to the caller
  pub fn release(self) -> (CE, CLK, IO, D) {
    (self.ce, self.clk, self.io, self.delay)
  }

  /// Put the bus in its idle state: CE and SCLK low, IO released
  pub fn idle(&mut self) -> Result<(), E> {
    self.ce.set_low()?;
    self.clk.set_low()?;
    self.io.set_input()
  }

  /// Start a transaction: SCLK low, then CE high, then the setup delay.
  /// CE is released when the returned guard is dropped, on every path.
  pub fn begin(&mut self) -> Result<Transfer<'_, CE, CLK, IO, D>, E> {
    self.clk.set_low()?;
    self.ce.set_high()?;
    self.delay.delay_us(self.timing.setup_us);
    Ok(Transfer { wire: self })
  }

  fn pulse_clock(&mut self) -> Result<(), E> {
    self.clk.set_high()?;
    self.delay.delay_us(self.timing.settle_us);
    self.clk.set_low()
  }

  fn write_byte(&mut self, value: u8) -> Result<(), E> {
    self.io.set_output()?;
    let mut remaining = value;
    for _ in 0..8 {
      if remaining & 1 != 0 {
        self.io.set_high()?;
      } else {
        self.io.set_low()?;
      }
      self.pulse_clock()?;
      remaining >>= 1;
    }
    Ok(())
  }

  fn read_byte(&mut self) -> Result<u8, E> {
    // direction first, then sample
    self.io.set_input()?;
    let mut value = 0u8;
    for i in 0..8 {
      if self.io.is_high()? {
        value |= 1 << i;
      }
      self.pulse_clock()?;
    }
    Ok(value)
  }
}

/// An open 3-wire transaction. Dropping it deasserts CE and waits out
/// the CE inactive time.
pub struct Transfer<'a, CE: OutputPin, CLK, IO, D: DelayUs<u8>> {
  wire: &'a mut ThreeWire<CE, CLK, IO, D>,
}

impl<'a, CE, CLK, IO, D, E> Transfer<'a, CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  /// Shift one byte out to the device
  pub fn write(&mut self, value: u8) -> Result<(), E> {
    self.wire.write_byte(value)
  }

  /// Shift one byte in from the device
  pub fn read(&mut self) -> Result<u8, E> {
    self.wire.read_byte()
  }
}

impl<'a, CE: OutputPin, CLK, IO, D: DelayUs<u8>> Drop for Transfer<'a, CE, CLK, IO, D> {
  fn drop(&mut self) {
    // nowhere to report a pin error from here; the next begin() will surface it
    let _ = self.wire.ce.set_low();
    self.wire.delay.delay_us(self.wire.timing.hold_us);
  }
}
