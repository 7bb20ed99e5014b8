//! DS1307 64 x 8 serial I2C RTC

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};
use rtcc::{DateTimeAccess, NaiveDateTime};

use crate::i2c::I2cRegisters;
use crate::registers::{Flag, Registers, ScratchRam};
use crate::time::{weekday_from_wire, weekday_to_wire, CivilTime, BASE_YEAR_OFFSET};
use crate::{bcd, read_datetime, write_datetime, Error, Rtc};

// Fixed i2c bus address of the device (7-bit)
pub const DS1307_ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
// Square wave output control: OUT, SQWE, RS1, RS0
const REG_CONTROL: u8 = 0x07;
// First byte of the 56 byte battery-backed RAM (0x08..0x3F)
const REG_RAM: u8 = 0x08;

// CH: oscillator halted while set
const CLOCK_HALT: Flag = Flag::new(REG_SECONDS, 1 << 7);
const OUT_BIT: u8 = 1 << 7;
const SQUARE_WAVE_ENABLE: Flag = Flag::new(REG_CONTROL, 1 << 4);
const RATE_SELECT_BITS: u8 = 0b11;

/// Level or frequency on the SQW/OUT pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SquareWave {
  /// Square wave off, pin held low
  Low,
  /// Square wave off, pin held high
  High,
  Hz1,
  Hz4096,
  Hz8192,
  Hz32768,
}

impl From<u8> for SquareWave {
  fn from(control: u8) -> Self {
    use SquareWave::*;
    if control & SQUARE_WAVE_ENABLE.mask == 0 {
      return if control & OUT_BIT != 0 { High } else { Low };
    }
    match control & RATE_SELECT_BITS {
      0b00 => Hz1,
      0b01 => Hz4096,
      0b10 => Hz8192,
      _ => Hz32768,
    }
  }
}

impl From<SquareWave> for u8 {
  fn from(mode: SquareWave) -> u8 {
    use SquareWave::*;
    match mode {
      Low => 0x00,
      High => OUT_BIT,
      Hz1 => SQUARE_WAVE_ENABLE.mask,
      Hz4096 => SQUARE_WAVE_ENABLE.mask | 0b01,
      Hz8192 => SQUARE_WAVE_ENABLE.mask | 0b10,
      Hz32768 => SQUARE_WAVE_ENABLE.mask | 0b11,
    }
  }
}

/// Decode registers 0x00..0x06: sec, min, hour, weekday, date, month, year
pub fn decode_time(regs: &[u8; 7]) -> CivilTime {
  CivilTime {
    second: bcd::decode(regs[0] & 0x7F),
    minute: bcd::decode(regs[1] & 0x7F),
    hour: bcd::decode(regs[2] & 0x3F),
    weekday: weekday_from_wire(regs[3] & 0x07),
    day: bcd::decode(regs[4] & 0x3F),
    month: bcd::decode(regs[5] & 0x1F).wrapping_sub(1),
    year: BASE_YEAR_OFFSET + bcd::decode(regs[6]) as u16,
  }
}

/// Encode registers 0x00..0x06; CH is left clear
pub fn encode_time(t: &CivilTime) -> [u8; 7] {
  [
    bcd::encode(t.second),
    bcd::encode(t.minute),
    bcd::encode(t.hour),
    weekday_to_wire(t.weekday),
    bcd::encode(t.day),
    bcd::encode(t.month + 1),
    bcd::encode((t.year % 100) as u8),
  ]
}

/// DS1307 driver
pub struct Ds1307<I2C> {
  regs: I2cRegisters<I2C>,
}

impl<I2C, E> Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  pub fn new(i2c: I2C) -> Self {
    Ds1307 { regs: I2cRegisters::new(i2c, DS1307_ADDRESS) }
  }

  /// Driver for a DS1307 reached through an i2c mux
  pub fn new_with_mux(i2c: I2C, mux_addr: u8, mux_chan: u8) -> Self {
    Ds1307 { regs: I2cRegisters::new_with_mux(i2c, DS1307_ADDRESS, mux_addr, mux_chan) }
  }

  pub fn release(self) -> I2C {
    self.regs.release()
  }

  pub fn square_wave(&mut self) -> Result<SquareWave, E> {
    let control = self.read_register(REG_CONTROL)?;
    Ok(SquareWave::from(control))
  }

  pub fn set_square_wave(&mut self, mode: SquareWave) -> Result<(), E> {
    self.write_register(REG_CONTROL, mode.into())
  }

  pub fn is_square_wave_enabled(&mut self) -> Result<bool, E> {
    self.flag(SQUARE_WAVE_ENABLE)
  }

  /// Gate the square wave without changing the selected rate
  pub fn set_square_wave_enabled(&mut self, enable: bool) -> Result<(), E> {
    self.set_flag(SQUARE_WAVE_ENABLE, enable)
  }
}

impl<I2C, E> Registers for Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  type Error = E;

  fn read_register(&mut self, reg: u8) -> Result<u8, E> {
    self.regs.read_register(reg)
  }

  fn write_register(&mut self, reg: u8, value: u8) -> Result<(), E> {
    self.regs.write_register(reg, value)
  }
}

impl<I2C, E> ScratchRam for Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  const RAM_SIZE: u8 = 56;
  const OUT_OF_RANGE: u8 = 0x00;

  fn ram_register(index: u8) -> u8 {
    REG_RAM + index
  }
}

impl<I2C, E> Rtc for Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  fn probe(&mut self) -> bool {
    let found = self.regs.probe(REG_SECONDS);
    #[cfg(feature = "defmt")]
    if !found {
      defmt::warn!("DS1307 not found at {=u8:#x}", DS1307_ADDRESS);
    }
    found
  }

  fn time(&mut self) -> Result<CivilTime, E> {
    let mut buf = [0u8; 7];
    self.regs.read_burst(REG_SECONDS, &mut buf)?;
    Ok(decode_time(&buf))
  }

  fn set_time(&mut self, time: &CivilTime) -> Result<(), E> {
    self.regs.write_burst(REG_SECONDS, &encode_time(time))
  }

  fn is_running(&mut self) -> Result<bool, E> {
    Ok(!self.flag(CLOCK_HALT)?)
  }

  fn set_running(&mut self, running: bool) -> Result<(), E> {
    self.set_flag(CLOCK_HALT, !running)
  }
}

impl<I2C, E> DateTimeAccess for Ds1307<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
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

#[cfg(test)]
mod tests {
  use super::*;
  use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTrans};

  const ADDR: u8 = DS1307_ADDRESS;

  #[test]
  fn get_time() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_SECONDS], vec![0x80 | 0x05, 0x04, 0x03, 0x07, 0x02, 0x01, 0x99]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    let t = rtc.time().unwrap();
    assert_eq!(t, CivilTime { second: 5, minute: 4, hour: 3, weekday: 0, day: 2, month: 0, year: 199 });
    mock.done();
  }

  #[test]
  fn set_time() {
    let t = CivilTime { second: 30, minute: 45, hour: 18, day: 14, month: 6, year: 124, weekday: 0 };
    let expectations = [
      I2cTrans::write(ADDR, vec![REG_SECONDS, 0x30, 0x45, 0x18, 0x07, 0x14, 0x07, 0x24]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.set_time(&t).unwrap();
    mock.done();
  }

  #[test]
  fn time_codec_round_trip() {
    for weekday in 0..7 {
      let t = CivilTime { second: 59, minute: 0, hour: 23, day: 28, month: 1, year: 100 + weekday as u16 * 10, weekday };
      assert_eq!(decode_time(&encode_time(&t)), t);
    }
  }

  #[test]
  fn running_state() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_SECONDS], vec![0x80 | 0x12]),
      I2cTrans::write_read(ADDR, vec![REG_SECONDS], vec![0x80 | 0x12]),
      I2cTrans::write(ADDR, vec![REG_SECONDS, 0x12]),
      // already running: no write
      I2cTrans::write_read(ADDR, vec![REG_SECONDS], vec![0x12]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    assert!(!rtc.is_running().unwrap());
    rtc.set_running(true).unwrap();
    rtc.set_running(true).unwrap();
    mock.done();
  }

  #[test]
  fn square_wave_modes() {
    let expectations = [
      I2cTrans::write(ADDR, vec![REG_CONTROL, 0x11]),
      I2cTrans::write_read(ADDR, vec![REG_CONTROL], vec![0x11]),
      I2cTrans::write_read(ADDR, vec![REG_CONTROL], vec![0x80]),
      I2cTrans::write_read(ADDR, vec![REG_CONTROL], vec![0x13]),
      I2cTrans::write(ADDR, vec![REG_CONTROL, 0x03]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.set_square_wave(SquareWave::Hz4096).unwrap();
    assert_eq!(rtc.square_wave().unwrap(), SquareWave::Hz4096);
    assert_eq!(rtc.square_wave().unwrap(), SquareWave::High);
    rtc.set_square_wave_enabled(false).unwrap();
    mock.done();
  }

  #[test]
  fn ram_bounds() {
    let expectations = [
      I2cTrans::write(ADDR, vec![0x08, 0xAA]),
      I2cTrans::write(ADDR, vec![0x3F, 0x55]),
      I2cTrans::write_read(ADDR, vec![0x3F], vec![0x55]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Ds1307::new(mock.clone());
    rtc.set_ram(0, 0xAA).unwrap();
    rtc.set_ram(55, 0x55).unwrap();
    // one past the end: no bus traffic
    rtc.set_ram(56, 0x01).unwrap();
    assert_eq!(rtc.ram(56).unwrap(), 0x00);
    assert_eq!(rtc.ram(55).unwrap(), 0x55);
    mock.done();
  }
}
