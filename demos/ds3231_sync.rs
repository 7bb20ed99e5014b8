use anyhow::{anyhow, Result};
use chrono::Utc;
use linux_embedded_hal::I2cdev;
use rtclib::ds3231::{Alarm, SquareWave};
use rtclib::{Alarm1Rate, CivilTime, DateTimeAccess, Ds3231, Rtc};

/// Sync a DS3231 on /dev/i2c-1 to the system clock, then arm alarm 1
/// for the next full minute.
/// Tested on a Raspberry Pi 3+ with i2c-1 enabled via `sudo raspi-config`
/// and SDA, SCL, GND, 3.3V wired to the module.

fn main() -> Result<()> {
    let i2c = I2cdev::new("/dev/i2c-1")?;
    let mut rtc = Ds3231::new(i2c);

    if !rtc.probe() {
        return Err(anyhow!("no DS3231 at 0x{:02x}", rtclib::ds3231::DS3231_ADDRESS));
    }

    if rtc.lost_power()? {
        println!("oscillator stopped since last sync, time is stale");
        rtc.clear_lost_power()?;
    }
    println!("rtc before: {:?}", rtc.datetime());

    let sys_dt = Utc::now().naive_utc();
    rtc.set_datetime(&sys_dt).map_err(|e| anyhow!("set_datetime: {:?}", e))?;
    rtc.set_running(true)?;
    let rtc_dt = rtc.datetime().map_err(|e| anyhow!("datetime: {:?}", e))?;
    println!("sys {} rtc {}", sys_dt, rtc_dt);

    // INT pin signals alarms, not a square wave
    rtc.set_square_wave(SquareWave::Off)?;
    rtc.clear_alarm(Alarm::One)?;
    let at_next_minute = CivilTime { second: 0, ..rtc.time()? };
    rtc.set_alarm1(&at_next_minute, Alarm1Rate::MatchSeconds)?;
    rtc.set_alarm_interrupt(Alarm::One, true)?;
    let (alarm_time, rate) = rtc.alarm1()?;
    println!("alarm1 {:?} at second {}", rate, alarm_time.second);

    println!("temperature {:.2} C, aging offset {}", rtc.temperature_celsius()?, rtc.aging_offset()?);
    Ok(())
}
