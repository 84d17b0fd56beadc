// SPDX-License-Identifier: GPL-3.0-only

//! Infrared illuminator control over Raspberry Pi GPIO
//!
//! The IR LED array hangs off two output lines that must always agree: the
//! illuminator is either fully on (both high) or fully off (both low). Lines
//! are driven through `rppal`, which talks to the GPIO block directly and so
//! does not depend on the deprecated sysfs interface.

use crate::errors::IlluminatorError;
use rppal::gpio::{Gpio, OutputPin};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// A single digital output line
pub trait OutputLine: Send {
    /// Line number, for diagnostics
    fn line(&self) -> u32;

    /// Drive the line high (`true`) or low (`false`)
    fn set(&mut self, high: bool) -> io::Result<()>;

    /// Read back the current level
    fn get(&self) -> io::Result<bool>;
}

/// GPIO pin (BCM numbering) configured as an output
#[derive(Debug)]
pub struct GpioLine {
    pin: OutputPin,
}

impl GpioLine {
    /// Claim `line` on `gpio` as an output
    ///
    /// The current level is kept, and left in place when the line is
    /// released, so the lamp state survives between short-lived commands.
    pub fn open(gpio: &Gpio, line: u32) -> io::Result<Self> {
        let mut pin = gpio.get(bcm_pin(line)?).map_err(io::Error::other)?.into_output();
        pin.set_reset_on_drop(false);
        debug!(line, high = pin.is_set_high(), "GPIO line claimed");
        Ok(Self { pin })
    }
}

/// BCM pin number of a configured line
fn bcm_pin(line: u32) -> io::Result<u8> {
    u8::try_from(line).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("no GPIO line {line}")))
}

impl OutputLine for GpioLine {
    fn line(&self) -> u32 {
        u32::from(self.pin.pin())
    }

    fn set(&mut self, high: bool) -> io::Result<()> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }

    fn get(&self) -> io::Result<bool> {
        Ok(self.pin.is_set_high())
    }
}

struct IlluminatorState {
    lines: Vec<Box<dyn OutputLine>>,
    on: bool,
}

/// IR illuminator driven over a set of output lines
///
/// Thread-safe; the web layer and the capture worker share one instance.
pub struct Illuminator {
    state: Mutex<IlluminatorState>,
}

impl std::fmt::Debug for Illuminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Illuminator")
            .field("on", &self.status())
            .finish()
    }
}

impl Illuminator {
    /// Build an illuminator from already opened lines
    ///
    /// The initial state is read back from the hardware. If the lines
    /// disagree (e.g. after a crash mid-update) they are all driven low.
    pub fn new(mut lines: Vec<Box<dyn OutputLine>>) -> Result<Self, IlluminatorError> {
        let mut levels = Vec::with_capacity(lines.len());
        for l in &lines {
            let level = l.get().map_err(|source| IlluminatorError::Line {
                line: l.line(),
                source,
            })?;
            levels.push(level);
        }

        let on = !levels.is_empty() && levels.iter().all(|&high| high);
        if !on && levels.iter().any(|&high| high) {
            warn!("Illuminator lines disagree, switching all off");
            drive_all(&mut lines, false)?;
        }

        Ok(Self {
            state: Mutex::new(IlluminatorState { lines, on }),
        })
    }

    /// Claim the given GPIO lines (BCM numbering)
    pub fn open_gpio(lines: &[u32]) -> Result<Self, IlluminatorError> {
        let gpio = Gpio::new().map_err(|e| IlluminatorError::Gpio(e.to_string()))?;
        let mut opened: Vec<Box<dyn OutputLine>> = Vec::with_capacity(lines.len());
        for &line in lines {
            let pin = GpioLine::open(&gpio, line).map_err(|source| IlluminatorError::Line { line, source })?;
            opened.push(Box::new(pin));
        }
        info!(?lines, "IR illuminator ready");
        Self::new(opened)
    }

    /// Switch the illuminator on
    pub fn turn_on(&self) -> Result<(), IlluminatorError> {
        self.set(true)
    }

    /// Switch the illuminator off
    pub fn turn_off(&self) -> Result<(), IlluminatorError> {
        self.set(false)
    }

    /// Invert the current state, returning the new one
    pub fn toggle(&self) -> Result<bool, IlluminatorError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let target = !state.on;
        apply(&mut state, target)?;
        Ok(target)
    }

    /// Whether the illuminator is currently on
    pub fn status(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).on
    }

    /// Switch on and return a guard that switches off again when dropped
    pub fn engage(self: &Arc<Self>) -> Result<IlluminatorGuard, IlluminatorError> {
        self.turn_on()?;
        Ok(IlluminatorGuard {
            illuminator: Arc::clone(self),
        })
    }

    fn set(&self, on: bool) -> Result<(), IlluminatorError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state, on)
    }
}

/// Drive every line to `on`; on a partial failure fall back to all-off so the
/// lines never disagree
fn apply(state: &mut IlluminatorState, on: bool) -> Result<(), IlluminatorError> {
    match drive_all(&mut state.lines, on) {
        Ok(()) => {
            state.on = on;
            debug!(on, "Illuminator switched");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Illuminator switch failed, forcing lines low");
            for l in state.lines.iter_mut() {
                let _ = l.set(false);
            }
            state.on = false;
            Err(e)
        }
    }
}

fn drive_all(lines: &mut [Box<dyn OutputLine>], high: bool) -> Result<(), IlluminatorError> {
    for l in lines.iter_mut() {
        l.set(high).map_err(|source| IlluminatorError::Line {
            line: l.line(),
            source,
        })?;
    }
    Ok(())
}

/// Keeps the illuminator on for as long as it lives
#[derive(Debug)]
pub struct IlluminatorGuard {
    illuminator: Arc<Illuminator>,
}

impl Drop for IlluminatorGuard {
    fn drop(&mut self) {
        if let Err(e) = self.illuminator.turn_off() {
            warn!(error = %e, "Failed to switch illuminator off");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MemoryLine {
        line: u32,
        level: Arc<AtomicBool>,
        broken: bool,
    }

    impl OutputLine for MemoryLine {
        fn line(&self) -> u32 {
            self.line
        }

        fn set(&mut self, high: bool) -> io::Result<()> {
            if self.broken && high {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            self.level.store(high, Ordering::SeqCst);
            Ok(())
        }

        fn get(&self) -> io::Result<bool> {
            Ok(self.level.load(Ordering::SeqCst))
        }
    }

    fn lines(initial: [bool; 2], broken_second: bool) -> (Vec<Box<dyn OutputLine>>, Vec<Arc<AtomicBool>>) {
        let levels: Vec<_> = initial.iter().map(|&l| Arc::new(AtomicBool::new(l))).collect();
        let boxed = levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                Box::new(MemoryLine {
                    line: i as u32,
                    level: Arc::clone(level),
                    broken: broken_second && i == 1,
                }) as Box<dyn OutputLine>
            })
            .collect();
        (boxed, levels)
    }

    fn levels(l: &[Arc<AtomicBool>]) -> Vec<bool> {
        l.iter().map(|a| a.load(Ordering::SeqCst)).collect()
    }

    #[test]
    fn test_turn_on_twice_is_idempotent() {
        let (boxed, lv) = lines([false, false], false);
        let ir = Illuminator::new(boxed).unwrap();
        ir.turn_on().unwrap();
        ir.turn_on().unwrap();
        assert!(ir.status());
        assert_eq!(levels(&lv), [true, true]);
    }

    #[test]
    fn test_toggle_keeps_lines_in_step() {
        let (boxed, lv) = lines([false, false], false);
        let ir = Illuminator::new(boxed).unwrap();
        assert!(ir.toggle().unwrap());
        assert_eq!(levels(&lv), [true, true]);
        assert!(!ir.toggle().unwrap());
        assert_eq!(levels(&lv), [false, false]);
    }

    #[test]
    fn test_disagreeing_lines_are_reset() {
        let (boxed, lv) = lines([true, false], false);
        let ir = Illuminator::new(boxed).unwrap();
        assert!(!ir.status());
        assert_eq!(levels(&lv), [false, false]);
    }

    #[test]
    fn test_initial_state_read_back() {
        let (boxed, _lv) = lines([true, true], false);
        let ir = Illuminator::new(boxed).unwrap();
        assert!(ir.status());
    }

    #[test]
    fn test_partial_failure_leaves_everything_off() {
        let (boxed, lv) = lines([false, false], true);
        let ir = Illuminator::new(boxed).unwrap();
        assert!(ir.turn_on().is_err());
        assert!(!ir.status());
        assert_eq!(levels(&lv), [false, false]);
    }

    #[test]
    fn test_guard_switches_off_on_drop() {
        let (boxed, lv) = lines([false, false], false);
        let ir = Arc::new(Illuminator::new(boxed).unwrap());
        {
            let _guard = ir.engage().unwrap();
            assert_eq!(levels(&lv), [true, true]);
        }
        assert!(!ir.status());
        assert_eq!(levels(&lv), [false, false]);
    }

    #[test]
    fn test_configured_lines_map_to_bcm_pins() {
        assert_eq!(bcm_pin(27).unwrap(), 27);
        assert_eq!(bcm_pin(0).unwrap(), 0);
        let err = bcm_pin(300).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("300"));
    }
}
