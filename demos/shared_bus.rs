use anyhow::Result;
use linux_embedded_hal::I2cdev;
use rtclib::pcf8563::ClockOut;
use rtclib::{Ds1307, Pcf8563, Rtc, ScratchRam};

/// Two clocks on one Linux i2c bus: copy the time of a DS1307
/// into a PCF8563 and keep a boot counter in the DS1307 RAM.

const BOOT_COUNT_SLOT: u8 = 0;

fn main() -> Result<()> {
    let i2c = I2cdev::new("/dev/i2c-1")?;
    let bus = shared_bus::BusManagerSimple::new(i2c);

    let mut ds1307 = Ds1307::new(bus.acquire_i2c());
    let mut pcf8563 = Pcf8563::new(bus.acquire_i2c());

    println!("ds1307 present: {} pcf8563 present: {}", ds1307.probe(), pcf8563.probe());

    if !ds1307.is_running()? {
        println!("ds1307 halted, starting oscillator");
        ds1307.set_running(true)?;
    }

    let boots = ds1307.ram(BOOT_COUNT_SLOT)?.wrapping_add(1);
    ds1307.set_ram(BOOT_COUNT_SLOT, boots)?;

    let t = ds1307.time()?;
    pcf8563.set_time(&t)?;
    pcf8563.set_clock_out(ClockOut::Hz1)?;
    println!("boot {} ds1307 {:?} pcf8563 {:?}", boots, t, pcf8563.time()?);
    Ok(())
}
