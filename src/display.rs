//! Operator status readout for the two-line character display.

use std::fmt::Write as _;

use crate::acquisition::snapshot::SessionMetrics;
use crate::acquisition::HaltReason;

/// Character display adapter (16x2 LCD on the target).
pub trait StatusDisplay {
    fn show(&mut self, upper: &str, lower: &str);
}

/// Both display lines, rendered into buffers that are reused every cycle.
#[derive(Debug, Default)]
pub struct StatusLines {
    upper: String,
    lower: String,
}

impl StatusLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper: attention, meditation, poor signal, battery.
    /// Lower: cycles run and raw samples collected.
    pub fn render_status(&mut self, metrics: &SessionMetrics, cycles: u16) {
        self.upper.clear();
        self.lower.clear();
        // Writing into a String cannot fail.
        let _ = write!(
            self.upper,
            "{} {} {} {}",
            metrics.attention, metrics.meditation, metrics.poor_signal, metrics.battery_level
        );
        let _ = write!(self.lower, "{cycles} {}", metrics.sample_count);
    }

    pub fn render_halt(&mut self, reason: HaltReason) {
        self.upper.clear();
        self.lower.clear();
        self.upper.push_str(&reason.diagnostic());
        self.lower.push_str("halted");
    }

    pub fn upper(&self) -> &str {
        &self.upper
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }

    pub fn show_on<D: StatusDisplay + ?Sized>(&self, display: &mut D) {
        display.show(&self.upper, &self.lower);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Lcd {
        lines: Option<(String, String)>,
    }

    impl StatusDisplay for Lcd {
        fn show(&mut self, upper: &str, lower: &str) {
            self.lines = Some((upper.to_string(), lower.to_string()));
        }
    }

    #[test]
    fn status_lines_layout() {
        let metrics = SessionMetrics {
            battery_level: 200,
            poor_signal: 0,
            attention: 61,
            meditation: 47,
            sample_count: 1024,
        };
        let mut lines = StatusLines::new();
        lines.render_status(&metrics, 7);

        let mut lcd = Lcd::default();
        lines.show_on(&mut lcd);
        assert_eq!(
            lcd.lines,
            Some(("61 47 0 200".to_string(), "7 1024".to_string()))
        );
    }

    #[test]
    fn rerender_reuses_buffers() {
        let mut lines = StatusLines::new();
        lines.render_status(&SessionMetrics { attention: 100, ..Default::default() }, 65535);
        let capacity = (lines.upper.capacity(), lines.lower.capacity());

        lines.render_status(&SessionMetrics::default(), 1);
        assert_eq!((lines.upper(), lines.lower()), ("0 0 0 0", "1 0"));
        assert_eq!((lines.upper.capacity(), lines.lower.capacity()), capacity);
    }

    #[test]
    fn halt_diagnostic() {
        let mut lines = StatusLines::new();
        lines.render_status(&SessionMetrics::default(), 3);
        lines.render_halt(HaltReason::RawPayloadLength(3));
        assert_eq!((lines.upper(), lines.lower()), ("raw>2!: 3", "halted"));
    }
}
