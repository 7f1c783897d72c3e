//! Host-side stand-ins for the headset and rover hardware.
//! The synthetic headset plays the part of the UART receive interrupt: it runs
//! on its own thread and pushes decoded fields through the ingress adapter.

use std::f32::consts::PI;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::acquisition::ingress::{FieldCode, IngressAdapter, IngressError};
use crate::config::SimulationConfig;
use crate::control::{ActuatorChannel, ActuatorDriver};
use crate::display::StatusDisplay;

/// Deterministic field generator: a pure tone on the RAW channel plus slowly
/// sweeping eSense readings.
pub struct SyntheticHeadset {
    config: SimulationConfig,
    frame_len: usize,
    tick: u64,
}

impl SyntheticHeadset {
    /// `frame_len` is the transform size, so `tone_bin` lines up with a bin.
    pub fn new(config: SimulationConfig, frame_len: usize) -> Self {
        Self {
            config,
            frame_len,
            tick: 0,
        }
    }

    fn raw_sample(&self) -> i16 {
        let phase = 2.0 * PI * self.config.tone_bin as f32 * self.tick as f32 / self.frame_len as f32;
        (self.config.tone_amplitude as f32 * phase.sin()).round() as i16
    }

    /// eSense values for the given report number, each in 0..=100.
    fn esense(report: u64) -> (u8, u8) {
        let triangle = |x: u64| {
            let x = x % 200;
            (if x > 100 { 200 - x } else { x }) as u8
        };
        (triangle(report * 7), triangle(report * 13 + 40))
    }

    /// Deliver the next raw sample, plus an eSense block when one is due.
    pub fn step<const N: usize>(&mut self, ingress: &IngressAdapter<N>) -> Result<(), IngressError> {
        let every = u64::from(self.config.esense_every.max(1));
        if self.tick % every == 0 {
            let (attention, meditation) = Self::esense(self.tick / every);
            ingress.on_field(0, FieldCode::PoorSignal as u8, &[0])?;
            ingress.on_field(0, FieldCode::Battery as u8, &[200])?;
            ingress.on_field(0, FieldCode::Attention as u8, &[attention])?;
            ingress.on_field(0, FieldCode::Meditation as u8, &[meditation])?;
        }
        ingress.on_field(0, FieldCode::RawSignal as u8, &self.raw_sample().to_be_bytes())?;
        self.tick += 1;
        Ok(())
    }
}

/// Run the synthetic headset on a dedicated thread at the configured sample rate.
pub fn spawn_producer<const N: usize>(
    config: SimulationConfig,
    ingress: IngressAdapter<N>,
    stop: Arc<AtomicBool>,
) -> io::Result<std::thread::JoinHandle<()>> {
    let interval = Duration::from_secs_f64(1.0 / f64::from(config.sample_rate_hz.max(1)));
    std::thread::Builder::new()
        .name("headset-rx".into())
        .spawn(move || {
            let mut headset = SyntheticHeadset::new(config, N);
            info!("synthetic headset streaming");
            while !stop.load(Ordering::Relaxed) {
                if let Err(e) = headset.step(&ingress) {
                    warn!(error = %e, "synthetic headset stopped");
                    break;
                }
                std::thread::sleep(interval);
            }
        })
}

/// Motor driver that only logs channel values.
#[derive(Debug, Default)]
pub struct LoggingMotors {
    last: [u8; 2],
}

impl ActuatorDriver for LoggingMotors {
    fn set_actuator(&mut self, channel: ActuatorChannel, value: u8) {
        let slot = &mut self.last[channel as usize];
        if *slot != value {
            debug!(?channel, value, "motor");
        }
        *slot = value;
    }
}

/// Status display that writes both lines to the log.
#[derive(Debug, Default)]
pub struct LoggingDisplay;

impl StatusDisplay for LoggingDisplay {
    fn show(&mut self, upper: &str, lower: &str) {
        debug!(upper, lower, "lcd");
    }
}
