//! NXP PCF8563 low power I2C RTC

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};
use rtcc::{DateTimeAccess, NaiveDateTime};

use crate::alarm::{decode_field, encode_field, AlarmMatch, Weekdays, ALARM_DISABLED_BIT};
use crate::i2c::I2cRegisters;
use crate::registers::{Flag, Registers};
use crate::time::{join_century, split_century, CivilTime};
use crate::{bcd, read_datetime, write_datetime, Error, Rtc};

// Fixed i2c bus address of the device (7-bit)
pub const PCF8563_ADDRESS: u8 = 0x51;

const REG_CONTROL_1: u8 = 0x00;
const REG_CONTROL_2: u8 = 0x01;
// VL + seconds, first of the seven time registers (0x02..0x08)
const REG_SECONDS: u8 = 0x02;
// Minute, hour, day, weekday alarms (0x09..0x0C)
const REG_ALARM: u8 = 0x09;
const REG_CLKOUT: u8 = 0x0D;

const CENTURY_BIT: u8 = 1 << 7;

// STOP: all RTC divider chain flip-flops held in reset while set
const STOP: Flag = Flag::new(REG_CONTROL_1, 1 << 5);
const ALARM_FLAG: Flag = Flag::new(REG_CONTROL_2, 1 << 3);
const ALARM_INTERRUPT_ENABLE: Flag = Flag::new(REG_CONTROL_2, 1 << 1);
// VL: clock integrity is no longer guaranteed
const VOLTAGE_LOW: Flag = Flag::new(REG_SECONDS, 1 << 7);

const CLKOUT_ENABLE_BIT: u8 = 1 << 7;
const CLKOUT_FREQ_BITS: u8 = 0b11;

// Timer off, source clock 1/60 Hz (lowest power)
const TIMER_CONTROL_DEFAULT: u8 = 0x03;

/// Frequency on the CLKOUT pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockOut {
  /// Output disabled (high impedance)
  Off,
  Hz32768,
  Hz1024,
  Hz32,
  Hz1,
}

impl From<u8> for ClockOut {
  fn from(reg_val: u8) -> Self {
    use ClockOut::*;
    if reg_val & CLKOUT_ENABLE_BIT == 0 {
      return Off;
    }
    match reg_val & CLKOUT_FREQ_BITS {
      0b00 => Hz32768,
      0b01 => Hz1024,
      0b10 => Hz32,
      _ => Hz1,
    }
  }
}

impl From<ClockOut> for u8 {
  fn from(freq: ClockOut) -> u8 {
    use ClockOut::*;
    match freq {
      Off => 0x00,
      Hz32768 => CLKOUT_ENABLE_BIT,
      Hz1024 => CLKOUT_ENABLE_BIT | 0b01,
      Hz32 => CLKOUT_ENABLE_BIT | 0b10,
      Hz1 => CLKOUT_ENABLE_BIT | 0b11,
    }
  }
}

/// Decode registers 0x02..0x08: VL + sec, min, hour, date, weekday,
/// century + month, year
pub fn decode_time(regs: &[u8; 7]) -> CivilTime {
  CivilTime {
    second: bcd::decode(regs[0] & 0x7F),
    minute: bcd::decode(regs[1] & 0x7F),
    hour: bcd::decode(regs[2] & 0x3F),
    day: bcd::decode(regs[3] & 0x3F),
    weekday: regs[4] & 0x07,
    month: bcd::decode(regs[5] & 0x1F).wrapping_sub(1),
    year: join_century(regs[5] & CENTURY_BIT != 0, bcd::decode(regs[6])),
  }
}

/// Encode registers 0x02..0x08; VL is left clear
pub fn encode_time(t: &CivilTime) -> [u8; 7] {
  let (century, year) = split_century(t.year);
  [
    bcd::encode(t.second),
    bcd::encode(t.minute),
    bcd::encode(t.hour),
    bcd::encode(t.day),
    t.weekday,
    bcd::encode(t.month + 1) | if century { CENTURY_BIT } else { 0 },
    bcd::encode(year),
  ]
}

/// Alarm registers (minute, hour, day, weekday). Only the lowest weekday
/// of the set can be matched.
fn encode_alarm(alarm: &AlarmMatch) -> [u8; 4] {
  [
    encode_field(alarm.minute),
    encode_field(alarm.hour),
    encode_field(alarm.day),
    encode_field(alarm.weekdays.first()),
  ]
}

fn decode_alarm(regs: &[u8; 4]) -> AlarmMatch {
  AlarmMatch {
    minute: decode_field(regs[0], 0x7F),
    hour: decode_field(regs[1], 0x3F),
    day: decode_field(regs[2], 0x3F),
    weekdays: decode_field(regs[3], 0x07)
      .map(Weekdays::single)
      .unwrap_or(Weekdays::NONE),
  }
}

// Contents of registers 0x00..0x0F after a voltage loss
fn reset_image() -> [u8; 16] {
  let mut image = [0u8; 16];
  image[REG_SECONDS as usize..REG_SECONDS as usize + 7].copy_from_slice(&encode_time(&CivilTime::RESET));
  image[REG_ALARM as usize..REG_ALARM as usize + 4].fill(ALARM_DISABLED_BIT);
  image[REG_CLKOUT as usize + 1] = TIMER_CONTROL_DEFAULT;
  image
}

/// PCF8563 driver
pub struct Pcf8563<I2C> {
  regs: I2cRegisters<I2C>,
}

impl<I2C, E> Pcf8563<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  pub fn new(i2c: I2C) -> Self {
    Pcf8563 { regs: I2cRegisters::new(i2c, PCF8563_ADDRESS) }
  }

  /// Driver for a PCF8563 reached through an i2c mux
  pub fn new_with_mux(i2c: I2C, mux_addr: u8, mux_chan: u8) -> Self {
    Pcf8563 { regs: I2cRegisters::new_with_mux(i2c, PCF8563_ADDRESS, mux_addr, mux_chan) }
  }

  pub fn release(self) -> I2C {
    self.regs.release()
  }

  fn init(&mut self) -> Result<(), E> {
    if self.voltage_low()? {
      #[cfg(feature = "defmt")]
      defmt::warn!("PCF8563 voltage low, registers reset");
      self.regs.write_burst(REG_CONTROL_1, &reset_image())?;
    }
    Ok(())
  }

  /// Whether the supply dropped low enough that the time may be wrong
  pub fn voltage_low(&mut self) -> Result<bool, E> {
    self.flag(VOLTAGE_LOW)
  }

  pub fn alarm(&mut self) -> Result<AlarmMatch, E> {
    let mut buf = [0u8; 4];
    self.regs.read_burst(REG_ALARM, &mut buf)?;
    Ok(decode_alarm(&buf))
  }

  /// Program the alarm. Day of month and weekday are separate registers
  /// here, so both can be matched at once.
  pub fn set_alarm(&mut self, alarm: &AlarmMatch) -> Result<(), E> {
    self.regs.write_burst(REG_ALARM, &encode_alarm(alarm))
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
    Ok(ClockOut::from(self.read_register(REG_CLKOUT)?))
  }

  pub fn set_clock_out(&mut self, freq: ClockOut) -> Result<(), E> {
    self.write_register(REG_CLKOUT, freq.into())
  }
}

impl<I2C, E> Registers for Pcf8563<I2C>
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

impl<I2C, E> Rtc for Pcf8563<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  /// Also resets every register if the chip reports a voltage drop
  fn probe(&mut self) -> bool {
    let found = self.init().is_ok();
    #[cfg(feature = "defmt")]
    if !found {
      defmt::warn!("PCF8563 not found at {=u8:#x}", PCF8563_ADDRESS);
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
    Ok(!self.flag(STOP)?)
  }

  fn set_running(&mut self, running: bool) -> Result<(), E> {
    self.set_flag(STOP, !running)
  }
}

impl<I2C, E> DateTimeAccess for Pcf8563<I2C>
  where
    I2C: Write<Error = E> + Read<Error = E> + WriteRead<Error = E>,
{
  type Error = Error<E>;

  fn datetime(&mut self) -> Result<NaiveDateTime, Self::Error> {
    read_datetime(self)
  }

  fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
    write_datetime(self, datetime)
  }
}
