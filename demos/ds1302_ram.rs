use anyhow::{anyhow, Result};
use embedded_hal::digital::v2::{InputPin, OutputPin};
use linux_embedded_hal::sysfs_gpio::{Direction, Error as GpioError};
use linux_embedded_hal::{Delay, SysfsPin};
use rtclib::ds1302::TrickleCharger;
use rtclib::{Ds1302, IoLine, Rtc, ScratchRam};

/// DS1302 on three sysfs GPIO lines (BCM numbering).
/// Prints the time, enables the trickle charger and round-trips the
/// 31 byte RAM through a burst transfer.

const CE_GPIO: u64 = 17;
const SCLK_GPIO: u64 = 27;
const IO_GPIO: u64 = 22;

// Sysfs pin whose direction follows the 3-wire transfer
struct DataPin(SysfsPin);

impl InputPin for DataPin {
    type Error = GpioError;

    fn is_high(&self) -> Result<bool, GpioError> {
        self.0.is_high()
    }

    fn is_low(&self) -> Result<bool, GpioError> {
        self.0.is_low()
    }
}

impl OutputPin for DataPin {
    type Error = GpioError;

    fn set_low(&mut self) -> Result<(), GpioError> {
        self.0.set_low()
    }

    fn set_high(&mut self) -> Result<(), GpioError> {
        self.0.set_high()
    }
}

impl IoLine for DataPin {
    fn set_input(&mut self) -> Result<(), GpioError> {
        self.0.set_direction(Direction::In)
    }

    fn set_output(&mut self) -> Result<(), GpioError> {
        self.0.set_direction(Direction::Out)
    }
}

fn output_pin(num: u64) -> Result<SysfsPin> {
    let pin = SysfsPin::new(num);
    pin.export()?;
    pin.set_direction(Direction::Low)?;
    Ok(pin)
}

fn main() -> Result<()> {
    let ce = output_pin(CE_GPIO)?;
    let sclk = output_pin(SCLK_GPIO)?;
    let io = SysfsPin::new(IO_GPIO);
    io.export()?;

    let mut rtc = Ds1302::new(ce, sclk, DataPin(io), Delay);
    if !rtc.probe() {
        return Err(anyhow!("DS1302 did not respond"));
    }
    println!("time {:?} running {}", rtc.time()?, rtc.is_running()?);

    rtc.set_trickle_charger(TrickleCharger::OneDiode2K)?;
    println!("trickle charger {:?}", rtc.trickle_charger()?);

    let pattern: Vec<u8> = (0..31u8).map(|i| i.wrapping_mul(7)).collect();
    let written = rtc.write_ram_burst(&pattern)?;
    let mut readback = [0u8; 31];
    let read = rtc.read_ram_burst(&mut readback)?;
    println!("ram burst wrote {} read {} match {}", written, read, readback[..] == pattern[..]);
    println!("ram[30] = {:#04x}, ram[31] = {:#04x}", rtc.ram(30)?, rtc.ram(31)?);
    Ok(())
}
