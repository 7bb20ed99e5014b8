#![cfg_attr(not(test), no_std)]

//! no_std drivers for five Real Time Clock (RTC) chips behind one interface:
//!
//! | chip | bus | module |
//! |------|-----|--------|
//! | DS1302 | bit-banged 3-wire (CE, SCLK, IO) | [`ds1302`] |
//! | DS1307 | I2C, 0x68 | [`ds1307`] |
//! | DS3231 | I2C, 0x68 | [`ds3231`] |
//! | RX-8900 | I2C, 0x32 | [`rx8900`] |
//! | PCF8563 | I2C, 0x51 | [`pcf8563`] |
//!
//! All drivers implement [`Rtc`] (probe, time, running state, raw registers)
//! and [`rtcc::DateTimeAccess`]. Chip specific features such as alarms,
//! square wave output, trickle charging and scratch RAM are inherent methods
//! on each driver.
//!
//! Times cross the API as [`CivilTime`], whose weekday is always 0 = Sunday
//! regardless of how the chip numbers weekdays.
//!
//! Bus errors are passed through unchanged. Nothing is retried, and
//! unrecognised register contents decode to explicit `Invalid` / `Off`
//! values rather than errors.

pub use rtcc::{DateTimeAccess, NaiveDate, NaiveDateTime};

pub mod alarm;
pub mod bcd;
pub mod bitbang;
pub mod ds1302;
pub mod ds1307;
pub mod ds3231;
pub mod i2c;
pub mod pcf8563;
pub mod registers;
pub mod rx8900;
pub mod time;

pub use alarm::{Alarm1Rate, Alarm2Rate, AlarmMatch, Weekdays};
pub use bitbang::{IoLine, Timing};
pub use ds1302::Ds1302;
pub use ds1307::Ds1307;
pub use ds3231::Ds3231;
pub use pcf8563::Pcf8563;
pub use registers::{Flag, Registers, ScratchRam};
pub use rx8900::Rx8900;
pub use time::CivilTime;

/// Error returned by the [`DateTimeAccess`] implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// The bus or pins failed
  Bus(E),
  /// The chip holds, or the caller passed, a date chrono or the chip
  /// cannot represent
  InvalidDateTime,
}

impl<E> From<E> for Error<E> {
  fn from(e: E) -> Self {
    Error::Bus(e)
  }
}

/// Capabilities shared by every RTC driver in this crate
pub trait Rtc: Registers {
  /// Check that the device answers, and bring it into a known state.
  /// Bus failures are reported as `false`.
  fn probe(&mut self) -> bool;

  /// Read the current time in one burst
  fn time(&mut self) -> Result<CivilTime, Self::Error>;

  /// Write the time in one burst
  fn set_time(&mut self, time: &CivilTime) -> Result<(), Self::Error>;

  /// Whether the oscillator is running
  fn is_running(&mut self) -> Result<bool, Self::Error>;

  /// Start or stop the oscillator
  fn set_running(&mut self, running: bool) -> Result<(), Self::Error>;
}

pub(crate) fn read_datetime<R: Rtc>(rtc: &mut R) -> Result<NaiveDateTime, Error<R::Error>> {
  let time = rtc.time().map_err(Error::Bus)?;
  time.to_naive().ok_or(Error::InvalidDateTime)
}

pub(crate) fn write_datetime<R: Rtc>(
  rtc: &mut R,
  datetime: &NaiveDateTime,
) -> Result<(), Error<R::Error>> {
  let time = CivilTime::from_naive(datetime).ok_or(Error::InvalidDateTime)?;
  rtc.set_time(&time).map_err(Error::Bus)
}
