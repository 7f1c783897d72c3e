//! Analysis-and-control cycle: snapshot → spectrum → telemetry → policy → actuator.
//! Runs on the main loop only. Never touches the ring except through a snapshot.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::acquisition::session::{DongleLink, Session};
use crate::acquisition::snapshot::{SessionMetrics, Snapshot};
use crate::acquisition::{HaltReason, SharedAcquisition};
use crate::config::CycleTrigger;
use crate::control::{self, ActuatorCommand, ActuatorDriver, ControlPolicy};
use crate::display::{StatusDisplay, StatusLines};
use crate::metrics::{MetricsRegistry, Stage};
use crate::spectrum::{SpectralTransform, Spectrum};
use crate::state_machine::{PipelineStatus, StatusMachine};
use crate::telemetry::TelemetryEmitter;

/// How long the loop waits between checks of the buffer-ready flag.
const READY_POLL: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub enum PipelineError {
    /// Fatal: no further telemetry or actuator commands will be issued.
    Halted(HaltReason),
    Connect(io::Error),
    Status(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Halted(reason) => write!(f, "pipeline halted: {reason}"),
            PipelineError::Connect(e) => write!(f, "headset connect failed: {e}"),
            PipelineError::Status(msg) => write!(f, "status error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Connect(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u16,
    pub metrics: SessionMetrics,
    pub command: ActuatorCommand,
    pub peak_bin: Option<usize>,
}

pub struct Pipeline<const N: usize> {
    acquisition: Arc<SharedAcquisition<N>>,
    transform: SpectralTransform<N>,
    policy: ControlPolicy,
    trigger: CycleTrigger,
    telemetry: Option<TelemetryEmitter<Box<dyn io::Write + Send>>>,
    actuator: Box<dyn ActuatorDriver + Send>,
    display: Option<Box<dyn StatusDisplay + Send>>,
    status: Arc<StatusMachine>,
    metrics: Arc<MetricsRegistry>,
    snapshot: Snapshot<N>,
    spectrum: Spectrum,
    status_lines: StatusLines,
    cycles: u16,
    halt_reported: bool,
}

impl<const N: usize> Pipeline<N> {
    pub fn new(
        acquisition: Arc<SharedAcquisition<N>>,
        policy: ControlPolicy,
        actuator: Box<dyn ActuatorDriver + Send>,
        status: Arc<StatusMachine>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            acquisition,
            transform: SpectralTransform::new(),
            policy,
            trigger: CycleTrigger::BufferReady,
            telemetry: None,
            actuator,
            display: None,
            status,
            metrics,
            snapshot: Snapshot::empty(),
            spectrum: Spectrum::zeroed(N / 2),
            status_lines: StatusLines::new(),
            cycles: 0,
            halt_reported: false,
        }
    }

    pub fn with_trigger(mut self, trigger: CycleTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_telemetry(mut self, out: Box<dyn io::Write + Send>) -> Self {
        self.telemetry = Some(TelemetryEmitter::new(out));
        self
    }

    pub fn with_display(mut self, display: Box<dyn StatusDisplay + Send>) -> Self {
        self.display = Some(display);
        self
    }

    /// Reset session metrics, request a headset connection and mark the
    /// pipeline as acquiring.
    pub fn connect<L: DongleLink>(&mut self, link: &mut L) -> Result<Session, PipelineError> {
        self.check_halted()?;
        let session = self
            .acquisition
            .connect_session(link)
            .map_err(PipelineError::Connect)?;
        self.status
            .transition(PipelineStatus::Acquiring)
            .map_err(PipelineError::Status)?;
        Ok(session)
    }

    /// One analysis-and-control cycle. Works only on buffers owned by the
    /// pipeline, so a steady-state cycle does not allocate.
    pub fn run_cycle(&mut self) -> Result<CycleReport, PipelineError> {
        self.check_halted()?;
        let cycle_start = Instant::now();

        let started = Instant::now();
        self.acquisition.snapshot_into(&mut self.snapshot);
        self.metrics.record(Stage::Snapshot, started.elapsed());

        let started = Instant::now();
        self.transform.transform_into(&self.snapshot, &mut self.spectrum);
        self.metrics.record(Stage::Transform, started.elapsed());

        // The producer may have halted while we were copying or transforming.
        self.check_halted()?;

        if let Some(telemetry) = self.telemetry.as_mut() {
            let started = Instant::now();
            if let Err(e) = telemetry.emit(&self.snapshot, &self.spectrum) {
                self.metrics.telemetry_dropped();
                warn!(error = %e, cycle = self.cycles, "telemetry frame dropped");
            }
            self.metrics.record(Stage::Telemetry, started.elapsed());
        }

        let metrics = *self.snapshot.metrics();
        let command = self.policy.decide(&metrics);

        self.check_halted()?;
        let started = Instant::now();
        control::apply(command, &mut *self.actuator);
        self.metrics.record(Stage::Actuate, started.elapsed());

        if let Some(display) = self.display.as_mut() {
            self.status_lines.render_status(&metrics, self.cycles);
            self.status_lines.show_on(&mut **display);
        }

        let report = CycleReport {
            cycle: self.cycles,
            metrics,
            command,
            peak_bin: self.spectrum.peak_bin(),
        };
        self.cycles = self.cycles.wrapping_add(1);
        self.metrics.record(Stage::Cycle, cycle_start.elapsed());
        Ok(report)
    }

    /// Perpetual loop. Returns the number of completed cycles when `stop` is
    /// set or `max_cycles` is reached, or the halt error.
    pub fn run(&mut self, stop: &AtomicBool, max_cycles: Option<u64>) -> Result<u64, PipelineError> {
        let mut completed = 0u64;
        info!(trigger = ?self.trigger, "analysis loop started");

        while !stop.load(Ordering::Relaxed) && max_cycles.map_or(true, |max| completed < max) {
            let cycle_start = Instant::now();

            if self.trigger == CycleTrigger::BufferReady && !self.acquisition.take_ready() {
                self.check_halted()?;
                self.metrics.idle_poll();
                std::thread::sleep(READY_POLL);
                continue;
            }

            let report = self.run_cycle()?;
            completed += 1;
            debug!(
                cycle = report.cycle,
                command = %report.command,
                attention = report.metrics.attention,
                meditation = report.metrics.meditation,
                peak_bin = ?report.peak_bin,
                "cycle_done"
            );

            if let Some(period) = self.trigger.period() {
                let elapsed = cycle_start.elapsed();
                if elapsed < period {
                    std::thread::sleep(period - elapsed);
                }
            }
        }

        info!(completed, "analysis loop stopped");
        Ok(completed)
    }

    pub fn cycles(&self) -> u16 {
        self.cycles
    }

    fn check_halted(&mut self) -> Result<(), PipelineError> {
        let Some(reason) = self.acquisition.halt_reason() else {
            return Ok(());
        };
        if !self.halt_reported {
            self.halt_reported = true;
            self.status.halt(reason);
            if let Some(display) = self.display.as_mut() {
                self.status_lines.render_halt(reason);
                self.status_lines.show_on(&mut **display);
            }
        }
        Err(PipelineError::Halted(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ingress::IngressAdapter;
    use crate::control::{ActuatorChannel, Power};
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Motors(Arc<Mutex<Vec<(ActuatorChannel, u8)>>>);

    impl ActuatorDriver for Motors {
        fn set_actuator(&mut self, channel: ActuatorChannel, value: u8) {
            self.0.lock().push((channel, value));
        }
    }

    #[derive(Clone, Default)]
    struct Lcd(Arc<Mutex<Vec<(String, String)>>>);

    impl StatusDisplay for Lcd {
        fn show(&mut self, upper: &str, lower: &str) {
            self.0.lock().push((upper.to_string(), lower.to_string()));
        }
    }

    struct Rig {
        acquisition: Arc<SharedAcquisition<8>>,
        ingress: IngressAdapter<8>,
        pipeline: Pipeline<8>,
        telemetry: SharedBuf,
        motors: Motors,
        lcd: Lcd,
        status: Arc<StatusMachine>,
        metrics: Arc<MetricsRegistry>,
    }

    fn rig(trigger: CycleTrigger) -> Rig {
        let acquisition = Arc::new(SharedAcquisition::<8>::new());
        let telemetry = SharedBuf::default();
        let motors = Motors::default();
        let lcd = Lcd::default();
        let status = Arc::new(StatusMachine::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let pipeline = Pipeline::new(
            Arc::clone(&acquisition),
            ControlPolicy::default(),
            Box::new(motors.clone()),
            Arc::clone(&status),
            Arc::clone(&metrics),
        )
        .with_trigger(trigger)
        .with_telemetry(Box::new(telemetry.clone()))
        .with_display(Box::new(lcd.clone()));
        Rig {
            ingress: IngressAdapter::new(Arc::clone(&acquisition)),
            acquisition,
            pipeline,
            telemetry,
            motors,
            lcd,
            status,
            metrics,
        }
    }

    #[test]
    fn cycle_emits_frame_and_drives_motors() {
        let mut rig = rig(CycleTrigger::BufferReady);
        rig.ingress.on_field(0, 0x04, &[75]).unwrap();
        rig.ingress.on_field(0, 0x80, &[0x00, 0x64]).unwrap();

        let report = rig.pipeline.run_cycle().unwrap();
        assert_eq!(report.cycle, 0);
        assert_eq!(report.command, ActuatorCommand::Drive(Power::new(30).unwrap()));
        assert_eq!(report.metrics.sample_count, 1);

        let text = String::from_utf8(rig.telemetry.0.lock().clone()).unwrap();
        assert!(text.starts_with("fft_input=[ 0 0 0 0 0 0 0 0 0 0 0 0 0 0 100 0 ];\r\nfft_lin_out=[ "));
        assert!(text.ends_with("];\r\n"));
        assert_eq!(text.matches("\r\n").count(), 2);

        assert_eq!(
            *rig.motors.0.lock(),
            vec![(ActuatorChannel::Left, 157), (ActuatorChannel::Right, 97)]
        );
        assert_eq!(rig.lcd.0.lock().last().unwrap().0, "75 0 0 0");

        assert_eq!(rig.pipeline.run_cycle().unwrap().cycle, 1);
        assert_eq!(rig.pipeline.cycles(), 2);

        let stats = rig.metrics.summary();
        for stage in Stage::ALL {
            assert_eq!(stats.stage(stage).map(|t| t.samples), Some(2), "{stage:?}");
        }
        assert_eq!(stats.telemetry_drops, 0);
    }

    #[test]
    fn halted_pipeline_issues_nothing() {
        let mut rig = rig(CycleTrigger::BufferReady);
        rig.pipeline.connect(&mut Vec::<u8>::new()).unwrap();
        rig.ingress.on_field(0, 0x04, &[90]).unwrap();
        assert!(rig.ingress.on_field(0, 0x80, &[1, 2, 3]).is_err());

        let err = rig.pipeline.run_cycle().unwrap_err();
        assert!(matches!(err, PipelineError::Halted(HaltReason::RawPayloadLength(3))));
        assert!(matches!(rig.pipeline.run_cycle(), Err(PipelineError::Halted(_))));

        assert!(rig.telemetry.0.lock().is_empty());
        assert!(rig.motors.0.lock().is_empty());
        assert_eq!(rig.status.current(), PipelineStatus::Halted);
        assert_eq!(
            *rig.lcd.0.lock(),
            vec![("raw>2!: 3".to_string(), "halted".to_string())]
        );

        let mut link: Vec<u8> = Vec::new();
        assert!(matches!(
            rig.pipeline.connect(&mut link),
            Err(PipelineError::Halted(_))
        ));
        assert!(link.is_empty());
        assert_eq!(rig.acquisition.snapshot().metrics().attention, 90);
    }

    #[test]
    fn connect_sends_request_and_marks_acquiring() {
        let mut rig = rig(CycleTrigger::BufferReady);
        rig.ingress.on_field(0, 0x05, &[99]).unwrap();

        let mut link: Vec<u8> = Vec::new();
        rig.pipeline.connect(&mut link).unwrap();
        assert_eq!(link, vec![0xC2]);
        assert_eq!(rig.status.current(), PipelineStatus::Acquiring);
        assert_eq!(rig.pipeline.run_cycle().unwrap().command, ActuatorCommand::Stop);
    }

    #[test]
    fn buffer_ready_trigger_waits_for_full_ring() {
        let mut rig = rig(CycleTrigger::BufferReady);
        let stop = AtomicBool::new(false);
        for s in 0..8 {
            rig.ingress.on_field(0, 0x80, &[0, s]).unwrap();
        }
        assert_eq!(rig.pipeline.run(&stop, Some(1)).unwrap(), 1);
        assert_eq!(rig.motors.0.lock().len(), 2);

        // Nothing new arrived: the loop idles until told to stop.
        std::thread::scope(|s| {
            s.spawn(|| {
                while rig.metrics.summary().idle_polls == 0 {
                    std::thread::sleep(READY_POLL);
                }
                stop.store(true, Ordering::Relaxed);
            });
            assert_eq!(rig.pipeline.run(&stop, Some(5)).unwrap(), 0);
        });
        assert_eq!(rig.motors.0.lock().len(), 2);
    }

    #[test]
    fn periodic_trigger_runs_without_samples() {
        let mut rig = rig(CycleTrigger::Periodic { period_ms: 1 });
        let stop = AtomicBool::new(false);
        assert_eq!(rig.pipeline.run(&stop, Some(3)).unwrap(), 3);
        assert_eq!(rig.motors.0.lock().len(), 6);
    }

    #[test]
    fn run_loop_returns_halt() {
        let mut rig = rig(CycleTrigger::BufferReady);
        let stop = AtomicBool::new(false);
        let _ = rig.ingress.on_field(0, 0x80, &[]);
        assert!(matches!(
            rig.pipeline.run(&stop, None),
            Err(PipelineError::Halted(HaltReason::RawPayloadLength(0)))
        ));
    }

    #[test]
    fn telemetry_failure_does_not_fail_cycle() {
        struct Unplugged;

        impl io::Write for Unplugged {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "tx down"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let motors = Motors::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let mut pipeline = Pipeline::<4>::new(
            Arc::new(SharedAcquisition::new()),
            ControlPolicy::default(),
            Box::new(motors.clone()),
            Arc::new(StatusMachine::new()),
            Arc::clone(&metrics),
        )
        .with_telemetry(Box::new(Unplugged));

        assert!(pipeline.run_cycle().is_ok());
        assert_eq!(motors.0.lock().len(), 2);
        assert_eq!(metrics.summary().telemetry_drops, 1);
    }
}
