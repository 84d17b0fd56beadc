// SPDX-License-Identifier: GPL-3.0-only

//! AHT20 temperature/humidity sensor on the Raspberry Pi I2C bus
//!
//! Every transfer to the AHT20 is a plain write or read with no register
//! byte, so the driver only needs raw transfers to one slave address.

use crate::errors::SensorError;
use rppal::i2c::I2c;
use serde::Serialize;
use std::io;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const CMD_INIT: [u8; 3] = [0xBE, 0x08, 0x00];
const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];
const CMD_SOFT_RESET: [u8; 1] = [0xBA];

const STATUS_BUSY: u8 = 0x80;
const STATUS_CALIBRATED: u8 = 0x08;

/// Busy polling interval
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Longest the sensor may report busy before the operation is abandoned
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw byte transport to a single I2C device
pub trait I2cBus: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

/// Hardware I2C bus bound to one slave address
#[derive(Debug)]
pub struct PiI2c {
    i2c: I2c,
}

impl PiI2c {
    pub fn open(bus: u8, address: u16) -> io::Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(io::Error::other)?;
        i2c.set_slave_address(address).map_err(io::Error::other)?;
        debug!(bus, address, "I2C device opened");
        Ok(Self { i2c })
    }
}

impl I2cBus for PiI2c {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let written = self.i2c.write(bytes).map_err(io::Error::other)?;
        whole_transfer(written, bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let read = self.i2c.read(buf).map_err(io::Error::other)?;
        whole_transfer(read, buf.len())
    }
}

/// A short transfer leaves the sensor mid-command
fn whole_transfer(transferred: usize, expected: usize) -> io::Result<()> {
    if transferred == expected {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("I2C transfer of {transferred} of {expected} bytes"),
        ))
    }
}

/// A single measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
}

/// AHT20 driver
pub struct Aht20<B: I2cBus> {
    bus: B,
    busy_timeout: Duration,
}

impl<B: I2cBus> Aht20<B> {
    /// Reset and calibrate the sensor
    pub fn new(bus: B) -> Result<Self, SensorError> {
        Self::with_timeout(bus, BUSY_TIMEOUT)
    }

    /// Like [`Aht20::new`] with a custom busy ceiling
    pub fn with_timeout(bus: B, busy_timeout: Duration) -> Result<Self, SensorError> {
        // power-on self initialization
        sleep(Duration::from_millis(40));

        let mut sensor = Self { bus, busy_timeout };
        sensor.reset()?;
        sensor.calibrate()?;
        info!("AHT20 calibrated");
        Ok(sensor)
    }

    /// Soft reset
    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.bus.write(&CMD_SOFT_RESET)?;
        sleep(Duration::from_millis(20));
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), SensorError> {
        self.busy_wait()?;
        self.bus.write(&CMD_INIT)?;
        sleep(Duration::from_millis(10));
        self.busy_wait()?;
        if self.status()? & STATUS_CALIBRATED == 0 {
            return Err(SensorError::Calibration);
        }
        Ok(())
    }

    /// Current status byte
    pub fn status(&mut self) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.bus.read(&mut buf)?;
        Ok(buf[0])
    }

    fn busy_wait(&mut self) -> Result<(), SensorError> {
        let started = Instant::now();
        while self.status()? & STATUS_BUSY != 0 {
            if started.elapsed() > self.busy_timeout {
                return Err(SensorError::Timeout(self.busy_timeout));
            }
            sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Trigger a measurement and read it back
    pub fn measure(&mut self) -> Result<Reading, SensorError> {
        self.busy_wait()?;
        self.bus.write(&CMD_TRIGGER)?;
        // conversion takes ~75 ms
        sleep(Duration::from_millis(80));
        self.busy_wait()?;

        let mut raw = [0u8; 6];
        self.bus.read(&mut raw)?;
        let reading = convert(&raw);
        debug!(temperature = reading.temperature, humidity = reading.humidity, "AHT20 reading");
        Ok(reading)
    }
}

/// Decode a 6-byte measurement frame (status + 2 × 20-bit values)
pub fn convert(raw: &[u8; 6]) -> Reading {
    let humidity_raw =
        (u32::from(raw[1]) << 12) | (u32::from(raw[2]) << 4) | (u32::from(raw[3]) >> 4);
    let temperature_raw =
        ((u32::from(raw[3]) & 0x0F) << 16) | (u32::from(raw[4]) << 8) | u32::from(raw[5]);

    let scale = f64::from(1u32 << 20);
    Reading {
        humidity: f64::from(humidity_raw) / scale * 100.0,
        temperature: f64::from(temperature_raw) / scale * 200.0 - 50.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers status reads with `status` and 6-byte reads with `frame`
    struct FakeBus {
        status: u8,
        frame: [u8; 6],
        writes: Vec<Vec<u8>>,
    }

    impl I2cBus for FakeBus {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<()> {
            if buf.len() == 1 {
                buf[0] = self.status;
            } else {
                buf.copy_from_slice(&self.frame[..buf.len()]);
            }
            Ok(())
        }
    }

    #[test]
    fn test_convert_midscale() {
        let reading = convert(&[0x1C, 0x80, 0x00, 0x08, 0x00, 0x00]);
        assert!((reading.humidity - 50.0).abs() < 1e-9);
        assert!((reading.temperature - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_extremes() {
        let low = convert(&[0, 0, 0, 0, 0, 0]);
        assert_eq!(low.humidity, 0.0);
        assert_eq!(low.temperature, -50.0);

        let high = convert(&[0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(high.humidity < 100.0 && high.humidity > 99.99);
        assert!(high.temperature < 150.0 && high.temperature > 149.99);
    }

    #[test]
    fn test_measure_sends_trigger() {
        let bus = FakeBus {
            status: STATUS_CALIBRATED,
            frame: [0x1C, 0x80, 0x00, 0x08, 0x00, 0x00],
            writes: Vec::new(),
        };
        let mut sensor = Aht20::new(bus).unwrap();
        let reading = sensor.measure().unwrap();
        assert!((reading.temperature - 50.0).abs() < 1e-9);
        assert_eq!(sensor.bus.writes.first().unwrap(), &CMD_SOFT_RESET.to_vec());
        assert_eq!(sensor.bus.writes.last().unwrap(), &CMD_TRIGGER.to_vec());
    }

    #[test]
    fn test_uncalibrated_sensor_is_rejected() {
        let bus = FakeBus {
            status: 0x00,
            frame: [0; 6],
            writes: Vec::new(),
        };
        assert!(matches!(Aht20::new(bus), Err(SensorError::Calibration)));
    }

    #[test]
    fn test_short_transfer_is_an_error() {
        assert!(whole_transfer(3, 3).is_ok());
        let err = whole_transfer(1, 6).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_busy_sensor_times_out() {
        let bus = FakeBus {
            status: STATUS_BUSY | STATUS_CALIBRATED,
            frame: [0; 6],
            writes: Vec::new(),
        };
        let result = Aht20::with_timeout(bus, Duration::from_millis(60));
        assert!(matches!(result, Err(SensorError::Timeout(_))));
    }
}
