//! Alarm register codecs.
//!
//! Two register designs are covered here:
//! - the DS3231 style, where every alarm field carries a mask bit and the
//!   combination of mask bits selects a repeat rate
//! - the RX-8900 style, where each field has its own disable bit and one
//!   shared selector decides whether the day field is a day of month or
//!   a set of weekdays

use crate::bcd;
use crate::time::{weekday_from_wire, weekday_to_wire, CivilTime};

// Bit 7 of each DS3231 alarm register: field is ignored when matching
const MASK_BIT: u8 = 1 << 7;
// Bit 6 of the DS3231 day/date alarm register: match weekday, not date
const DAY_SELECT_BIT: u8 = 1 << 6;

/// Alarm enable bit (AE) of the RX-8900 and PCF8563 alarm fields;
/// set means the field does not take part in matching
pub(crate) const ALARM_DISABLED_BIT: u8 = 1 << 7;

/// Repeat rate of a seconds-resolution alarm (DS3231 alarm 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alarm1Rate {
  /// Fires once per second
  EverySecond,
  /// Seconds match
  MatchSeconds,
  /// Minutes and seconds match
  MatchMinutes,
  /// Hours, minutes and seconds match
  MatchHours,
  /// Date, hours, minutes and seconds match
  MatchDate,
  /// Weekday, hours, minutes and seconds match
  MatchWeekday,
  /// The mask bits hold a combination the chip does not document
  Invalid,
}

/// Repeat rate of a minutes-resolution alarm (DS3231 alarm 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alarm2Rate {
  /// Fires once per minute, at second 00
  EveryMinute,
  /// Minutes match
  MatchMinutes,
  /// Hours and minutes match
  MatchHours,
  /// Date, hours and minutes match
  MatchDate,
  /// Weekday, hours and minutes match
  MatchWeekday,
  /// The mask bits hold a combination the chip does not document
  Invalid,
}

impl Alarm1Rate {
  // (mask bits A1M1..A1M4 as bits 0..3, day select)
  fn mask_bits(self) -> Option<(u8, bool)> {
    use Alarm1Rate::*;
    if self == Invalid {
      return None;
    }
    // a coarser repeat implies every finer field is masked too
    let m1 = self == EverySecond;
    let m2 = m1 || self == MatchSeconds;
    let m3 = m2 || self == MatchMinutes;
    let m4 = m3 || self == MatchHours;
    let bits = m1 as u8 | (m2 as u8) << 1 | (m3 as u8) << 2 | (m4 as u8) << 3;
    Some((bits, self == MatchWeekday))
  }

  fn from_mask_bits(bits: u8, day_select: bool) -> Self {
    use Alarm1Rate::*;
    match (bits, day_select) {
      (0b1111, _) => EverySecond,
      (0b1110, _) => MatchSeconds,
      (0b1100, _) => MatchMinutes,
      (0b1000, _) => MatchHours,
      (0b0000, false) => MatchDate,
      (0b0000, true) => MatchWeekday,
      _ => Invalid,
    }
  }
}

impl Alarm2Rate {
  // (mask bits A2M2..A2M4 as bits 0..2, day select)
  fn mask_bits(self) -> Option<(u8, bool)> {
    use Alarm2Rate::*;
    if self == Invalid {
      return None;
    }
    let m2 = self == EveryMinute;
    let m3 = m2 || self == MatchMinutes;
    let m4 = m3 || self == MatchHours;
    let bits = m2 as u8 | (m3 as u8) << 1 | (m4 as u8) << 2;
    Some((bits, self == MatchWeekday))
  }

  fn from_mask_bits(bits: u8, day_select: bool) -> Self {
    use Alarm2Rate::*;
    match (bits, day_select) {
      (0b111, _) => EveryMinute,
      (0b110, _) => MatchMinutes,
      (0b100, _) => MatchHours,
      (0b000, false) => MatchDate,
      (0b000, true) => MatchWeekday,
      _ => Invalid,
    }
  }
}

fn masked(value: u8, mask: bool) -> u8 {
  if mask { value | MASK_BIT } else { value }
}

fn is_masked(value: u8) -> u8 {
  (value & MASK_BIT != 0) as u8
}

// Day/date register contents for a given day select bit
fn encode_day_date(t: &CivilTime, day_select: bool) -> u8 {
  if day_select {
    DAY_SELECT_BIT | weekday_to_wire(t.weekday)
  } else {
    bcd::encode(t.day)
  }
}

// Fills either the weekday or the day of month of `t`, never both
fn decode_day_date(value: u8, t: &mut CivilTime) -> bool {
  let day_select = value & DAY_SELECT_BIT != 0;
  if day_select {
    t.weekday = weekday_from_wire(value & 0x0F);
  } else {
    t.day = bcd::decode(value & 0x3F);
  }
  day_select
}

/// Register image (seconds, minutes, hours, day/date) for a
/// seconds-resolution alarm. `Invalid` has no image.
pub fn encode_alarm1(t: &CivilTime, rate: Alarm1Rate) -> Option<[u8; 4]> {
  let (bits, day_select) = rate.mask_bits()?;
  Some([
    masked(bcd::encode(t.second), bits & 0b0001 != 0),
    masked(bcd::encode(t.minute), bits & 0b0010 != 0),
    masked(bcd::encode(t.hour), bits & 0b0100 != 0),
    masked(encode_day_date(t, day_select), bits & 0b1000 != 0),
  ])
}

/// Decode a seconds-resolution alarm. Only the second, minute, hour and
/// either day or weekday fields of the returned time are populated.
pub fn decode_alarm1(regs: &[u8; 4]) -> (CivilTime, Alarm1Rate) {
  let mut t = CivilTime {
    second: bcd::decode(regs[0] & 0x7F),
    minute: bcd::decode(regs[1] & 0x7F),
    hour: bcd::decode(regs[2] & 0x3F),
    ..CivilTime::default()
  };
  let day_select = decode_day_date(regs[3], &mut t);
  let bits = is_masked(regs[0])
    | is_masked(regs[1]) << 1
    | is_masked(regs[2]) << 2
    | is_masked(regs[3]) << 3;
  (t, Alarm1Rate::from_mask_bits(bits, day_select))
}

/// Register image (minutes, hours, day/date) for a minutes-resolution
/// alarm. `Invalid` has no image.
pub fn encode_alarm2(t: &CivilTime, rate: Alarm2Rate) -> Option<[u8; 3]> {
  let (bits, day_select) = rate.mask_bits()?;
  Some([
    masked(bcd::encode(t.minute), bits & 0b001 != 0),
    masked(bcd::encode(t.hour), bits & 0b010 != 0),
    masked(encode_day_date(t, day_select), bits & 0b100 != 0),
  ])
}

/// Decode a minutes-resolution alarm. Only the minute, hour and either
/// day or weekday fields of the returned time are populated.
pub fn decode_alarm2(regs: &[u8; 3]) -> (CivilTime, Alarm2Rate) {
  let mut t = CivilTime {
    minute: bcd::decode(regs[0] & 0x7F),
    hour: bcd::decode(regs[1] & 0x3F),
    ..CivilTime::default()
  };
  let day_select = decode_day_date(regs[2], &mut t);
  let bits = is_masked(regs[0])
    | is_masked(regs[1]) << 1
    | is_masked(regs[2]) << 2;
  (t, Alarm2Rate::from_mask_bits(bits, day_select))
}

/// A set of weekdays, bit 0 = Sunday .. bit 6 = Saturday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Weekdays(u8);

impl Weekdays {
  pub const NONE: Weekdays = Weekdays(0);
  pub const ALL: Weekdays = Weekdays(0x7F);

  /// Set from a raw bitmask; bit 7 is dropped
  pub const fn from_bits(bits: u8) -> Self {
    Weekdays(bits & 0x7F)
  }

  /// Set holding one weekday (0 = Sunday)
  pub const fn single(weekday: u8) -> Self {
    Weekdays(1 << (weekday % 7))
  }

  pub const fn bits(self) -> u8 {
    self.0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }

  pub const fn contains(self, weekday: u8) -> bool {
    weekday < 7 && self.0 & (1 << weekday) != 0
  }

  pub const fn with(self, weekday: u8) -> Self {
    Weekdays(self.0 | Self::single(weekday).0)
  }

  /// Lowest weekday in the set
  pub const fn first(self) -> Option<u8> {
    if self.0 == 0 {
      None
    } else {
      Some(self.0.trailing_zeros() as u8)
    }
  }
}

/// Field-wise alarm description for chips with a disable bit per field.
/// `None` (or an empty weekday set) means the field is not matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmMatch {
  pub minute: Option<u8>,
  pub hour: Option<u8>,
  pub day: Option<u8>,
  pub weekdays: Weekdays,
}

pub(crate) fn encode_field(value: Option<u8>) -> u8 {
  match value {
    Some(v) => bcd::encode(v),
    None => ALARM_DISABLED_BIT,
  }
}

pub(crate) fn decode_field(value: u8, mask: u8) -> Option<u8> {
  if value & ALARM_DISABLED_BIT != 0 {
    None
  } else {
    Some(bcd::decode(value & mask))
  }
}

/// Register image (minute, hour, week/day) and the day select bit for a
/// shared week/day alarm field.
/// Day select `true` means the third register is a day of month.
/// Asking for both a day of month and weekdays cannot be expressed, so
/// the week/day field is disabled in that case.
pub fn encode_week_day_alarm(alarm: &AlarmMatch) -> ([u8; 3], bool) {
  let (week_day, day_select) = match (alarm.day, alarm.weekdays.is_empty()) {
    (Some(day), true) => (bcd::encode(day), true),
    (None, false) => (alarm.weekdays.bits(), false),
    _ => (ALARM_DISABLED_BIT, false),
  };
  ([encode_field(alarm.minute), encode_field(alarm.hour), week_day], day_select)
}

/// Decode a shared week/day alarm; fills `day` or `weekdays`, never both
pub fn decode_week_day_alarm(regs: &[u8; 3], day_select: bool) -> AlarmMatch {
  let mut alarm = AlarmMatch {
    minute: decode_field(regs[0], 0x7F),
    hour: decode_field(regs[1], 0x3F),
    ..AlarmMatch::default()
  };
  if regs[2] & ALARM_DISABLED_BIT == 0 {
    if day_select {
      alarm.day = Some(bcd::decode(regs[2] & 0x3F));
    } else {
      alarm.weekdays = Weekdays::from_bits(regs[2]);
    }
  }
  alarm
}
