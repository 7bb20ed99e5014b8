//! DS1302 trickle-charge timekeeping chip, on a bit-banged 3-wire bus.
//!
//! Every register has a write command (even) and a read command (the
//! next odd value). Through [`Registers`] callers pass the write command;
//! the read bit is added here.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use rtcc::{DateTimeAccess, NaiveDateTime};

use crate::bitbang::{IoLine, ThreeWire, Timing};
use crate::registers::{Flag, Registers, ScratchRam};
use crate::time::{weekday_from_wire, weekday_to_wire, CivilTime, BASE_YEAR_OFFSET};
use crate::{bcd, read_datetime, write_datetime, Error, Rtc};

const READ_BIT: u8 = 1;

/// DS1302 command codes (write form)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
  Seconds = 0x80,
  Minutes = 0x82,
  Hours = 0x84,
  Date = 0x86,
  Month = 0x88,
  Weekday = 0x8A,
  Year = 0x8C,
  WriteProtect = 0x8E,
  TrickleCharger = 0x90,
  ClockBurst = 0xBE,
  Ram = 0xC0,
  RamBurst = 0xFE,
}

impl Register {
  pub const fn write_cmd(self) -> u8 {
    self as u8
  }

  pub const fn read_cmd(self) -> u8 {
    self as u8 | READ_BIT
  }
}

// CH: oscillator halted while set
const CLOCK_HALT: Flag = Flag::new(Register::Seconds as u8, 1 << 7);
const WRITE_PROTECT: Flag = Flag::new(Register::WriteProtect as u8, 1 << 7);

// Trickle charger register: TCS (7:4), DS diode select (3:2), RS resistor select (1:0)
const TCS_ENABLE: u8 = 0b1010_0000;
const TCS_MASK: u8 = 0xF0;

/// Trickle charger path: number of diodes and series resistor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrickleCharger {
  Off,
  OneDiode2K,
  OneDiode4K,
  OneDiode8K,
  TwoDiodes2K,
  TwoDiodes4K,
  TwoDiodes8K,
}

impl From<u8> for TrickleCharger {
  /// Anything but a fully valid TCS/DS/RS combination reads as `Off`
  fn from(value: u8) -> Self {
    use TrickleCharger::*;
    if value & TCS_MASK != TCS_ENABLE {
      return Off;
    }
    match value & 0x0F {
      0b0101 => OneDiode2K,
      0b0110 => OneDiode4K,
      0b0111 => OneDiode8K,
      0b1001 => TwoDiodes2K,
      0b1010 => TwoDiodes4K,
      0b1011 => TwoDiodes8K,
      _ => Off,
    }
  }
}

impl From<TrickleCharger> for u8 {
  fn from(tc: TrickleCharger) -> u8 {
    use TrickleCharger::*;
    let path = match tc {
      Off => return 0x00,
      OneDiode2K => 0b0101,
      OneDiode4K => 0b0110,
      OneDiode8K => 0b0111,
      TwoDiodes2K => 0b1001,
      TwoDiodes4K => 0b1010,
      TwoDiodes8K => 0b1011,
    };
    TCS_ENABLE | path
  }
}

/// Decode a clock burst: sec, min, hour, date, month, weekday, year
pub fn decode_time(regs: &[u8; 7]) -> CivilTime {
  CivilTime {
    second: bcd::decode(regs[0] & 0x7F),
    minute: bcd::decode(regs[1] & 0x7F),
    hour: bcd::decode(regs[2] & 0x3F),
    day: bcd::decode(regs[3] & 0x3F),
    month: bcd::decode(regs[4] & 0x1F).wrapping_sub(1),
    weekday: weekday_from_wire(regs[5] & 0x07),
    year: BASE_YEAR_OFFSET + bcd::decode(regs[6]) as u16,
  }
}

/// Encode a clock burst, including the trailing write-protect byte (cleared).
/// The seconds byte has CH clear, so writing it starts the oscillator.
pub fn encode_time(t: &CivilTime) -> [u8; 8] {
  [
    bcd::encode(t.second),
    bcd::encode(t.minute),
    bcd::encode(t.hour),
    bcd::encode(t.day),
    bcd::encode(t.month + 1),
    weekday_to_wire(t.weekday),
    bcd::encode((t.year % 100) as u8),
    0,
  ]
}

/// DS1302 driver
pub struct Ds1302<CE, CLK, IO, D> {
  wire: ThreeWire<CE, CLK, IO, D>,
}

impl<CE, CLK, IO, D, E> Ds1302<CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  pub fn new(ce: CE, sclk: CLK, io: IO, delay: D) -> Self {
    Ds1302 { wire: ThreeWire::new(ce, sclk, io, delay) }
  }

  /// New driver with non-default transport delays (eg for a 5V supply)
  pub fn with_timing(ce: CE, sclk: CLK, io: IO, delay: D, timing: Timing) -> Self {
    Ds1302 { wire: ThreeWire::with_timing(ce, sclk, io, delay, timing) }
  }

  pub fn release(self) -> (CE, CLK, IO, D) {
    self.wire.release()
  }

  // Writes are ignored until write protection is lifted
  fn init(&mut self) -> Result<(), E> {
    self.wire.idle()?;
    self.set_write_protected(false)?;
    self.set_running(true)
  }

  pub fn is_write_protected(&mut self) -> Result<bool, E> {
    self.flag(WRITE_PROTECT)
  }

  /// While write protection is on the chip ignores every write
  /// except to the write-protect register itself
  pub fn set_write_protected(&mut self, protect: bool) -> Result<(), E> {
    self.set_flag(WRITE_PROTECT, protect)
  }

  pub fn trickle_charger(&mut self) -> Result<TrickleCharger, E> {
    let reg_val = self.read_register(Register::TrickleCharger.write_cmd())?;
    Ok(TrickleCharger::from(reg_val))
  }

  pub fn set_trickle_charger(&mut self, tc: TrickleCharger) -> Result<(), E> {
    self.write_register(Register::TrickleCharger.write_cmd(), tc.into())
  }

  /// Read RAM from byte 0 in one burst. Fills at most `RAM_SIZE` bytes and
  /// returns how many were read.
  pub fn read_ram_burst(&mut self, buf: &mut [u8]) -> Result<usize, E> {
    let count = buf.len().min(Self::RAM_SIZE as usize);
    let mut tr = self.wire.begin()?;
    tr.write(Register::RamBurst.read_cmd())?;
    for byte in buf[..count].iter_mut() {
      *byte = tr.read()?;
    }
    Ok(count)
  }

  /// Write RAM from byte 0 in one burst. Writes at most `RAM_SIZE` bytes and
  /// returns how many were written.
  pub fn write_ram_burst(&mut self, data: &[u8]) -> Result<usize, E> {
    let count = data.len().min(Self::RAM_SIZE as usize);
    let mut tr = self.wire.begin()?;
    tr.write(Register::RamBurst.write_cmd())?;
    for byte in &data[..count] {
      tr.write(*byte)?;
    }
    Ok(count)
  }
}

impl<CE, CLK, IO, D, E> Registers for Ds1302<CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  type Error = E;

  fn read_register(&mut self, reg: u8) -> Result<u8, E> {
    let mut tr = self.wire.begin()?;
    tr.write(reg | READ_BIT)?;
    tr.read()
  }

  fn write_register(&mut self, reg: u8, value: u8) -> Result<(), E> {
    let mut tr = self.wire.begin()?;
    tr.write(reg & !READ_BIT)?;
    tr.write(value)
  }
}

impl<CE, CLK, IO, D, E> ScratchRam for Ds1302<CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  const RAM_SIZE: u8 = 31;
  const OUT_OF_RANGE: u8 = 0xFF;

  // RAM commands are interleaved read/write pairs
  fn ram_register(index: u8) -> u8 {
    Register::Ram.write_cmd() + (index << 1)
  }
}

impl<CE, CLK, IO, D, E> Rtc for Ds1302<CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  /// Idles the bus, lifts write protection and starts the oscillator.
  /// The 3-wire bus has no acknowledge, so only pin failures are detected.
  fn probe(&mut self) -> bool {
    let res = self.init();
    #[cfg(feature = "defmt")]
    if res.is_err() {
      defmt::warn!("DS1302 pin access failed during probe");
    }
    res.is_ok()
  }

  fn time(&mut self) -> Result<CivilTime, E> {
    let mut regs = [0u8; 7];
    let mut tr = self.wire.begin()?;
    tr.write(Register::ClockBurst.read_cmd())?;
    for reg in regs.iter_mut() {
      *reg = tr.read()?;
    }
    Ok(decode_time(&regs))
  }

  fn set_time(&mut self, time: &CivilTime) -> Result<(), E> {
    let mut tr = self.wire.begin()?;
    tr.write(Register::ClockBurst.write_cmd())?;
    for byte in encode_time(time) {
      tr.write(byte)?;
    }
    Ok(())
  }

  fn is_running(&mut self) -> Result<bool, E> {
    Ok(!self.flag(CLOCK_HALT)?)
  }

  fn set_running(&mut self, running: bool) -> Result<(), E> {
    self.set_flag(CLOCK_HALT, !running)
  }
}

impl<CE, CLK, IO, D, E> DateTimeAccess for Ds1302<CE, CLK, IO, D>
  where
    CE: OutputPin<Error = E>,
    CLK: OutputPin<Error = E>,
    IO: IoLine + InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u8>,
{
  type Error = Error<E>;

  /// Years 2000..2099 only; the chip holds two year digits
  fn datetime(&mut self) -> Result<NaiveDateTime, Self::Error> {
    read_datetime(self)
  }

  fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
    write_datetime(self, datetime)
  }
}
