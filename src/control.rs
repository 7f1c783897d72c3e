//! Closed-loop control: session metrics → actuator command → motor channel values.
//! The policy is a pure threshold function, re-evaluated every cycle with no
//! hysteresis, so noisy eSense readings can make the command chatter.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::acquisition::snapshot::SessionMetrics;
use crate::config::ControlConfig;

/// Channel value meaning "stopped" on a motor channel.
pub const NEUTRAL: u8 = 127;

/// Motor power offset from neutral, bounded so `NEUTRAL ± power` fits a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Power(u8);

impl Power {
    pub const MAX: u8 = NEUTRAL;

    pub fn new(power: u8) -> Option<Self> {
        (power <= Self::MAX).then_some(Self(power))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActuatorCommand {
    Stop,
    Drive(Power),
    Spin(Power),
}

impl ActuatorCommand {
    /// Values for (channel 0, channel 1). Drive runs the channels in opposite
    /// directions, spin runs them the same way.
    pub fn channel_values(self) -> [u8; 2] {
        match self {
            ActuatorCommand::Stop => [NEUTRAL, NEUTRAL],
            ActuatorCommand::Drive(p) => [NEUTRAL + p.get(), NEUTRAL - p.get()],
            ActuatorCommand::Spin(p) => [NEUTRAL + p.get(), NEUTRAL + p.get()],
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorCommand::Stop => write!(f, "Stop"),
            ActuatorCommand::Drive(p) => write!(f, "Drive({})", p.get()),
            ActuatorCommand::Spin(p) => write!(f, "Spin({})", p.get()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorChannel {
    Left = 0,
    Right = 1,
}

/// Motor driver adapter (PWM on the target).
pub trait ActuatorDriver {
    fn set_actuator(&mut self, channel: ActuatorChannel, value: u8);
}

/// Issue one `set_actuator` call per channel for `command`.
pub fn apply<D: ActuatorDriver + ?Sized>(command: ActuatorCommand, driver: &mut D) {
    let [left, right] = command.channel_values();
    driver.set_actuator(ActuatorChannel::Left, left);
    driver.set_actuator(ActuatorChannel::Right, right);
    debug!(%command, left, right, "actuator_set");
}

/// Threshold policy. Attention is checked first and wins over meditation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPolicy {
    pub attention_threshold: u8,
    pub meditation_threshold: u8,
    pub drive_power: Power,
    pub spin_power: Power,
}

impl ControlPolicy {
    pub fn from_config(config: &ControlConfig) -> Option<Self> {
        Some(Self {
            attention_threshold: config.attention_threshold,
            meditation_threshold: config.meditation_threshold,
            drive_power: Power::new(config.drive_power)?,
            spin_power: Power::new(config.spin_power)?,
        })
    }

    /// Strictly-greater comparisons: a reading equal to a threshold does not act.
    pub fn decide(&self, metrics: &SessionMetrics) -> ActuatorCommand {
        if metrics.attention > self.attention_threshold {
            ActuatorCommand::Drive(self.drive_power)
        } else if metrics.meditation > self.meditation_threshold {
            ActuatorCommand::Spin(self.spin_power)
        } else {
            ActuatorCommand::Stop
        }
    }
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self {
            attention_threshold: 60,
            meditation_threshold: 80,
            drive_power: Power(30),
            spin_power: Power(50),
        }
    }
}
