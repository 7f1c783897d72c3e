//! Telemetry: one text frame per cycle for host-side plotting tools.
//!
//! ```text
//! fft_input=[ <v0> <v1> ... <v_{2N-1}> ];\r\n
//! fft_lin_out=[ <m0> <m1> ... <m_{N/2-1}> ];\r\n
//! ```
//! Must never be called from the producer context: writes block until accepted.

use std::fmt::Write as _;
use std::io;

use crate::acquisition::snapshot::Snapshot;
use crate::spectrum::Spectrum;

const LINE_END: &[u8] = b"];\r\n";

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

pub struct TelemetryEmitter<W: io::Write> {
    out: W,
    frame: String,
}

impl<W: io::Write> TelemetryEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            frame: String::new(),
        }
    }

    /// Format and write one frame, blocking until flushed.
    ///
    /// A link that is only momentarily busy (`WouldBlock`, `Interrupted`) is
    /// retried until the whole frame is out. On a hard error after part of a
    /// frame went out, the open line is terminated so the next frame starts
    /// on a fresh line.
    pub fn emit<const N: usize>(
        &mut self,
        snapshot: &Snapshot<N>,
        spectrum: &Spectrum,
    ) -> io::Result<()> {
        self.frame.clear();
        format_frame(&mut self.frame, snapshot, spectrum);

        let frame = self.frame.as_bytes();
        let mut sent = 0;
        while sent < frame.len() {
            match self.out.write(&frame[sent..]) {
                Ok(0) => return Err(self.abandon(sent, io::ErrorKind::WriteZero.into())),
                Ok(n) => sent += n,
                Err(e) if is_transient(&e) => std::thread::yield_now(),
                Err(e) => return Err(self.abandon(sent, e)),
            }
        }
        loop {
            match self.out.flush() {
                Err(e) if is_transient(&e) => std::thread::yield_now(),
                other => return other,
            }
        }
    }

    /// Close a partially written line, best effort, and hand back `err`.
    fn abandon(&mut self, sent: usize, err: io::Error) -> io::Error {
        let written = &self.frame.as_bytes()[..sent];
        if !written.is_empty() && !written.ends_with(b"\n") {
            let _ = self.out.write_all(LINE_END);
            let _ = self.out.flush();
        }
        err
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn format_frame<const N: usize>(frame: &mut String, snapshot: &Snapshot<N>, spectrum: &Spectrum) {
    // Writing into a String cannot fail.
    frame.push_str("fft_input=[ ");
    for v in snapshot.interleaved() {
        let _ = write!(frame, "{v} ");
    }
    frame.push_str("];\r\n");

    frame.push_str("fft_lin_out=[ ");
    for m in spectrum.bins() {
        let _ = write!(frame, "{m} ");
    }
    frame.push_str("];\r\n");
}
