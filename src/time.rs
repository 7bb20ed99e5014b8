use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Calendar time as every driver in this crate reports it.
///
/// Field ranges follow the C `struct tm` conventions:
/// - `month` is 0..11 (0 = January)
/// - `year` counts years since 1900
/// - `weekday` is 0..6 (0 = Sunday)
///
/// Each chip stores weekdays differently on the wire (1..7, one-hot, 0..6);
/// the drivers translate at the register boundary so the numbering above is
/// the only one callers ever see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CivilTime {
  pub second: u8,
  pub minute: u8,
  pub hour: u8,
  /// Day of month, 1..31
  pub day: u8,
  pub month: u8,
  pub year: u16,
  pub weekday: u8,
}

/// Year offset (from 1900) of the first year each two-digit chip can hold
pub(crate) const BASE_YEAR_OFFSET: u16 = 100;

impl CivilTime {
  /// The value written by drivers that re-initialise a chip after
  /// supply loss: 2000-01-01 00:00:00, a Saturday.
  pub const RESET: CivilTime = CivilTime {
    second: 0,
    minute: 0,
    hour: 0,
    day: 1,
    month: 0,
    year: 100,
    weekday: 6,
  };

  /// Convert to a chrono datetime, if the fields describe a real instant
  pub fn to_naive(&self) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(
      1900 + self.year as i32,
      self.month as u32 + 1,
      self.day as u32,
    )?
    .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
  }

  /// Convert from a chrono datetime; years before 1900 are not representable
  pub fn from_naive(datetime: &NaiveDateTime) -> Option<Self> {
    let year = u16::try_from(datetime.year() - 1900).ok()?;
    Some(CivilTime {
      second: datetime.second() as u8,
      minute: datetime.minute() as u8,
      hour: datetime.hour() as u8,
      day: datetime.day() as u8,
      month: datetime.month0() as u8,
      year,
      weekday: datetime.weekday().num_days_from_sunday() as u8,
    })
  }
}

// Weekday encoded as 1..7 where 7 is Sunday
pub(crate) const fn weekday_to_wire(weekday: u8) -> u8 {
  if weekday == 0 { 7 } else { weekday }
}

pub(crate) const fn weekday_from_wire(value: u8) -> u8 {
  if value == 7 { 0 } else { value }
}

// Weekday encoded as a single set bit, bit 0 = Sunday
pub(crate) const fn weekday_to_one_hot(weekday: u8) -> u8 {
  1 << (weekday % 7)
}

pub(crate) const fn weekday_from_one_hot(value: u8) -> u8 {
  if value == 0 {
    0
  } else {
    value.trailing_zeros() as u8
  }
}

// Splits a year offset into (century flag, two-digit year)
pub(crate) const fn split_century(year: u16) -> (bool, u8) {
  (year >= 100, (year % 100) as u8)
}

pub(crate) const fn join_century(century: bool, year: u8) -> u16 {
  year as u16 + if century { 100 } else { 0 }
}
