//! Test and helper mocks for fpa_core

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use fpa_traits::{HwResult, LampSupply};

use crate::error::FpaError;
use crate::sensor::{ProcessSensor, Reading};

/// Sensor that replays a script of process-variable values.
///
/// `None` entries fail that cycle with `SensorRead`. Once the script runs
/// out, the last value repeats.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    script: VecDeque<Option<f64>>,
    last: f64,
    calls: Rc<RefCell<Vec<f64>>>,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: 0.0,
            calls: Rc::default(),
        }
    }

    /// Constant reading forever.
    pub fn constant(value: f64) -> Self {
        let mut s = Self::new([]);
        s.last = value;
        s
    }

    /// Shared log of the experiment times the sensor was sampled at.
    pub fn calls(&self) -> Rc<RefCell<Vec<f64>>> {
        Rc::clone(&self.calls)
    }
}

impl ProcessSensor for ScriptedSensor {
    fn channel_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn sample(&mut self, t_s: f64, _pretest: bool) -> Result<Reading, FpaError> {
        self.calls.borrow_mut().push(t_s);
        match self.script.pop_front() {
            Some(None) => Err(FpaError::SensorRead("scripted failure".into())),
            Some(Some(v)) => {
                self.last = v;
                Ok(Reading {
                    process_variable: v,
                    channels: Vec::new(),
                })
            }
            None => Ok(Reading {
                process_variable: self.last,
                channels: Vec::new(),
            }),
        }
    }
}

/// What a `RecordingLamps` has been told to do.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LampLog {
    pub commands: Vec<f64>,
    pub shutdowns: usize,
}

/// Lamp supply that records every command. Clones share the log.
#[derive(Debug, Default, Clone)]
pub struct RecordingLamps {
    log: Rc<RefCell<LampLog>>,
    fail_after: Option<usize>,
}

impl RecordingLamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `set_voltage` call once `n` commands have been accepted.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn log(&self) -> LampLog {
        self.log.borrow().clone()
    }

    pub fn last_command(&self) -> Option<f64> {
        self.log.borrow().commands.last().copied()
    }
}

impl LampSupply for RecordingLamps {
    fn set_voltage(&mut self, volts: f64) -> HwResult<()> {
        let mut log = self.log.borrow_mut();
        if let Some(n) = self.fail_after
            && log.commands.len() >= n
        {
            return Err(Box::new(std::io::Error::other("lamp supply not responding")));
        }
        log.commands.push(volts);
        Ok(())
    }

    fn shutdown(&mut self) -> HwResult<()> {
        self.log.borrow_mut().shutdowns += 1;
        Ok(())
    }
}
