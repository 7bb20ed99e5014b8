//! Epson RX-8900 temperature compensated I2C RTC

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};
use rtcc::{DateTimeAccess, NaiveDateTime};

use crate::alarm::{decode_week_day_alarm, encode_week_day_alarm, AlarmMatch, ALARM_DISABLED_BIT};
use crate::i2c::I2cRegisters;
use crate::registers::{Flag, Registers, ScratchRam};
use crate::time::{weekday_from_one_hot, weekday_to_one_hot, CivilTime, BASE_YEAR_OFFSET};
use crate::{bcd, read_datetime, write_datetime, Error, Rtc};

// Fixed i2c bus address of the device (7-bit)
pub const RX8900_ADDRESS: u8 = 0x32;

const REG_SECONDS: u8 = 0x00;
// Single byte of user RAM
const REG_RAM: u8 = 0x07;
// Alarm minute, hour, week/day (0x08..0x0A)
const REG_ALARM: u8 = 0x08;
// Extension: TEST WADA USEL TE FSEL1 FSEL0 TSEL1 TSEL0
const REG_EXTENSION: u8 = 0x0D;
// Flag: - - UF TF AF - VLF VDET
const REG_FLAG: u8 = 0x0E;
// Control: CSEL1 CSEL0 UIE TIE AIE - - RESET
const REG_CONTROL: u8 = 0x0F;

// WADA: week/day alarm register is a day of month when set
const ALARM_DAY_SELECT: Flag = Flag::new(REG_EXTENSION, 1 << 6);
const CLOCK_OUT_SELECT_BITS: u8 = 0b11 << 2;
const ALARM_FLAG: Flag = Flag::new(REG_FLAG, 1 << 3);
// VLF: supply dropped low enough that register contents are lost
const VOLTAGE_LOW: Flag = Flag::new(REG_FLAG, 1 << 1);
const ALARM_INTERRUPT_ENABLE: Flag = Flag::new(REG_CONTROL, 1 << 3);
// RESET: sub-second counter held (clock stopped) while set
const COUNTER_RESET: Flag = Flag::new(REG_CONTROL, 1 << 0);

// Temperature compensation every 2 seconds (CSEL = 01)
const CONTROL_DEFAULT: u8 = 0x40;

/// Frequency on the FOUT pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockOut {
  Hz32768,
  Hz1024,
  Hz1,
}

impl From<u8> for ClockOut {
  /// From the extension register
  fn from(extension: u8) -> Self {
    match (extension & CLOCK_OUT_SELECT_BITS) >> 2 {
      0b01 => ClockOut::Hz1024,
      0b10 => ClockOut::Hz1,
      // 0b11 is documented to behave like 0b00
      _ => ClockOut::Hz32768,
    }
  }
}

impl ClockOut {
  fn select_bits(self) -> u8 {
    match self {
      ClockOut::Hz32768 => 0b00 << 2,
      ClockOut::Hz1024 => 0b01 << 2,
      ClockOut::Hz1 => 0b10 << 2,
    }
  }
}

/// Decode registers 0x00..0x06: sec, min, hour, weekday (one-hot), date,
/// month, year
pub fn decode_time(regs: &[u8; 7]) -> CivilTime {
  CivilTime {
    second: bcd::decode(regs[0] & 0x7F),
    minute: bcd::decode(regs[1] & 0x7F),
    hour: bcd::decode(regs[2] & 0x3F),
    weekday: weekday_from_one_hot(regs[3] & 0x7F),
    day: bcd::decode(regs[4] & 0x3F),
    month: bcd::decode(regs[5] & 0x1F).wrapping_sub(1),
    year: BASE_YEAR_OFFSET + bcd::decode(regs[6]) as u16,
  }
}

pub fn encode_time(t: &CivilTime) -> [u8; 7] {
  [
    bcd::encode(t.second),
    bcd::encode(t.minute),
    bcd::encode(t.hour),
    weekday_to_one_hot(t.weekday),
    bcd::encode(t.day),
    bcd::encode(t.month + 1),
    bcd::encode((t.year % 100) as u8),
  ]
}

// Contents of registers 0x00..0x0F after a voltage loss
fn reset_image() -> [u8; 16] {
  let mut image = [0u8; 16];
  image[..7].copy_from_slice(&encode_time(&CivilTime::RESET));
  // RAM and timer counters stay 0
  image[REG_ALARM as usize..REG_ALARM as usize + 3].fill(ALARM_DISABLED_BIT);
  image[REG_CONTROL as usize] = CONTROL_DEFAULT;
  image
}

/// RX-8900 driver
pub struct Rx8900<I2C> {
  regs: I2cRegisters<I2C>,
}

impl<I2C, E> Rx8900<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  pub fn new(i2c: I2C) -> Self {
    Rx8900 { regs: I2cRegisters::new(i2c, RX8900_ADDRESS) }
  }

  /// Driver for a RX-8900 reached through an i2c mux
  pub fn new_with_mux(i2c: I2C, mux_addr: u8, mux_chan: u8) -> Self {
    Rx8900 { regs: I2cRegisters::new_with_mux(i2c, RX8900_ADDRESS, mux_addr, mux_chan) }
  }

  pub fn release(self) -> I2C {
    self.regs.release()
  }

  // Rewrite every register after a voltage loss
  fn init(&mut self) -> Result<(), E> {
    if self.voltage_low()? {
      #[cfg(feature = "defmt")]
      defmt::warn!("RX-8900 voltage low, registers re-initialised");
      self.regs.write_burst(REG_SECONDS, &reset_image())?;
    }
    Ok(())
  }

  /// Whether the supply dropped far enough that time and settings were lost
  pub fn voltage_low(&mut self) -> Result<bool, E> {
    self.flag(VOLTAGE_LOW)
  }

  pub fn alarm(&mut self) -> Result<AlarmMatch, E> {
    let mut buf = [0u8; 3];
    self.regs.read_burst(REG_ALARM, &mut buf)?;
    let day_select = self.flag(ALARM_DAY_SELECT)?;
    Ok(decode_week_day_alarm(&buf, day_select))
  }

  /// Program the alarm. The chip matches either a day of month or a set
  /// of weekdays; if both are given the week/day field is disabled.
  /// AF is cleared before and after, so a match against stale or half
  /// written registers is not reported.
  pub fn set_alarm(&mut self, alarm: &AlarmMatch) -> Result<(), E> {
    let (buf, day_select) = encode_week_day_alarm(alarm);
    self.clear_alarm()?;
    self.regs.write_burst(REG_ALARM, &buf)?;
    self.set_flag(ALARM_DAY_SELECT, day_select)?;
    self.clear_alarm()
  }

  pub fn alarm_fired(&mut self) -> Result<bool, E> {
    self.flag(ALARM_FLAG)
  }

  pub fn clear_alarm(&mut self) -> Result<(), E> {
    self.set_flag(ALARM_FLAG, false)
  }

  /// Toggle whether the alarm asserts the INT pin
  pub fn set_alarm_interrupt(&mut self, enable: bool) -> Result<(), E> {
    self.set_flag(ALARM_INTERRUPT_ENABLE, enable)
  }

  pub fn clock_out(&mut self) -> Result<ClockOut, E> {
    Ok(ClockOut::from(self.read_register(REG_EXTENSION)?))
  }

  pub fn set_clock_out(&mut self, freq: ClockOut) -> Result<(), E> {
    let extension = self.read_register(REG_EXTENSION)?;
    let reg_val = (extension & !CLOCK_OUT_SELECT_BITS) | freq.select_bits();
    if reg_val != extension {
      self.write_register(REG_EXTENSION, reg_val)?;
    }
    Ok(())
  }
}

impl<I2C, E> Registers for Rx8900<I2C>
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

impl<I2C, E> ScratchRam for Rx8900<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  const RAM_SIZE: u8 = 1;
  const OUT_OF_RANGE: u8 = 0x00;

  fn ram_register(index: u8) -> u8 {
    REG_RAM + index
  }
}

impl<I2C, E> Rtc for Rx8900<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  /// Also restores default register contents if the chip lost its supply
  fn probe(&mut self) -> bool {
    let found = self.init().is_ok();
    #[cfg(feature = "defmt")]
    if !found {
      defmt::warn!("RX-8900 not found at {=u8:#x}", RX8900_ADDRESS);
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
    Ok(!self.flag(COUNTER_RESET)?)
  }

  fn set_running(&mut self, running: bool) -> Result<(), E> {
    self.set_flag(COUNTER_RESET, !running)
  }
}

impl<I2C, E> DateTimeAccess for Rx8900<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  type Error = Error<E>;

  /// Years 2000..2099 only
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
  use crate::alarm::Weekdays;
  use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTrans};
  use embedded_hal_mock::MockError;
  use std::io::ErrorKind;

  const ADDR: u8 = RX8900_ADDRESS;

  #[test]
  fn weekday_is_one_hot_on_the_wire() {
    let t = CivilTime { second: 1, minute: 2, hour: 3, day: 4, month: 5, year: 123, weekday: 0 };
    let expectations = [
      I2cTrans::write(ADDR, vec![REG_SECONDS, 0x01, 0x02, 0x03, 0x01, 0x04, 0x06, 0x23]),
      I2cTrans::write_read(ADDR, vec![REG_SECONDS], vec![0x01, 0x02, 0x03, 0x40, 0x04, 0x06, 0x23]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    rtc.set_time(&t).unwrap();
    assert_eq!(rtc.time().unwrap(), CivilTime { weekday: 6, ..t });
    mock.done();
  }

  #[test]
  fn time_codec_round_trip() {
    for weekday in 0..7 {
      let t = CivilTime { second: 0, minute: 59, hour: 12, day: 31, month: 11, year: 199, weekday };
      assert_eq!(decode_time(&encode_time(&t)), t);
    }
  }

  #[test]
  fn probe_leaves_healthy_chip_alone() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x00]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    assert!(rtc.probe());
    mock.done();
  }

  #[test]
  fn probe_reinitialises_after_voltage_loss() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x02]),
      I2cTrans::write(ADDR, vec![
        REG_SECONDS,
        0x00, 0x00, 0x00, 0x40, 0x01, 0x01, 0x00, // 2000-01-01 Saturday
        0x00, // RAM
        0x80, 0x80, 0x80, // alarm disabled
        0x00, 0x00, // timer
        0x00, 0x00, // extension, flag
        0x40, // control
      ]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    assert!(rtc.probe());
    mock.done();
  }

  #[test]
  fn probe_reports_missing_device() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x00])
        .with_error(MockError::Io(ErrorKind::Other)),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    assert!(!rtc.probe());
    mock.done();
  }

  #[test]
  fn weekday_alarm() {
    let alarm = AlarmMatch {
      minute: Some(30),
      hour: Some(7),
      day: None,
      weekdays: Weekdays::single(1).with(3),
    };
    let expectations = [
      // stale AF from the previous alarm is cleared first
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x08]),
      I2cTrans::write(ADDR, vec![REG_FLAG, 0x00]),
      I2cTrans::write(ADDR, vec![REG_ALARM, 0x30, 0x07, 0b0000_1010]),
      // WADA set from an earlier day alarm: clear it
      I2cTrans::write_read(ADDR, vec![REG_EXTENSION], vec![0x40]),
      I2cTrans::write(ADDR, vec![REG_EXTENSION, 0x00]),
      // AF raised while the registers were half written
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x08]),
      I2cTrans::write(ADDR, vec![REG_FLAG, 0x00]),
      I2cTrans::write_read(ADDR, vec![REG_ALARM], vec![0x30, 0x07, 0b0000_1010]),
      I2cTrans::write_read(ADDR, vec![REG_EXTENSION], vec![0x00]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    rtc.set_alarm(&alarm).unwrap();
    assert_eq!(rtc.alarm().unwrap(), alarm);
    mock.done();
  }

  #[test]
  fn day_of_month_alarm() {
    let alarm = AlarmMatch { minute: None, hour: Some(12), day: Some(15), weekdays: Weekdays::NONE };
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x00]),
      I2cTrans::write(ADDR, vec![REG_ALARM, 0x80, 0x12, 0x15]),
      I2cTrans::write_read(ADDR, vec![REG_EXTENSION], vec![0x00]),
      I2cTrans::write(ADDR, vec![REG_EXTENSION, 0x40]),
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x00]),
      I2cTrans::write_read(ADDR, vec![REG_ALARM], vec![0x80, 0x12, 0x15]),
      I2cTrans::write_read(ADDR, vec![REG_EXTENSION], vec![0x40]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    rtc.set_alarm(&alarm).unwrap();
    assert_eq!(rtc.alarm().unwrap(), alarm);
    mock.done();
  }

  #[test]
  fn alarm_flag_and_interrupt() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x08]),
      I2cTrans::write_read(ADDR, vec![REG_FLAG], vec![0x08]),
      I2cTrans::write(ADDR, vec![REG_FLAG, 0x00]),
      I2cTrans::write_read(ADDR, vec![REG_CONTROL], vec![0x40]),
      I2cTrans::write(ADDR, vec![REG_CONTROL, 0x48]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    assert!(rtc.alarm_fired().unwrap());
    rtc.clear_alarm().unwrap();
    rtc.set_alarm_interrupt(true).unwrap();
    mock.done();
  }

  #[test]
  fn clock_out_select() {
    assert_eq!(ClockOut::from(0b0000_1100), ClockOut::Hz32768);
    assert_eq!(ClockOut::from(0b0000_1000), ClockOut::Hz1);
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_EXTENSION], vec![0x4C]),
      I2cTrans::write(ADDR, vec![REG_EXTENSION, 0x44]),
      I2cTrans::write_read(ADDR, vec![REG_EXTENSION], vec![0x44]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    rtc.set_clock_out(ClockOut::Hz1024).unwrap();
    assert_eq!(rtc.clock_out().unwrap(), ClockOut::Hz1024);
    mock.done();
  }

  #[test]
  fn running_state() {
    let expectations = [
      I2cTrans::write_read(ADDR, vec![REG_CONTROL], vec![0x41]),
      I2cTrans::write_read(ADDR, vec![REG_CONTROL], vec![0x41]),
      I2cTrans::write(ADDR, vec![REG_CONTROL, 0x40]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    assert!(!rtc.is_running().unwrap());
    rtc.set_running(true).unwrap();
    mock.done();
  }

  #[test]
  fn single_byte_ram() {
    let expectations = [
      I2cTrans::write(ADDR, vec![REG_RAM, 0x5A]),
      I2cTrans::write_read(ADDR, vec![REG_RAM], vec![0x5A]),
    ];
    let mut mock = I2cMock::new(&expectations);
    let mut rtc = Rx8900::new(mock.clone());
    rtc.set_ram(0, 0x5A).unwrap();
    rtc.set_ram(1, 0xFF).unwrap();
    assert_eq!(rtc.ram(0).unwrap(), 0x5A);
    assert_eq!(rtc.ram(1).unwrap(), 0x00);
    mock.done();
  }
}
