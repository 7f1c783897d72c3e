//! Ingress adapter: receives decoded ThinkGear fields from the external stream
//! parser and stores them. Runs in the receive-interrupt context, so every path
//! is O(1) and allocation-free.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use super::snapshot::SessionMetrics;
use super::{HaltReason, SharedAcquisition};

/// ThinkGear data codes handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldCode {
    Battery = 0x01,
    PoorSignal = 0x02,
    Attention = 0x04,
    Meditation = 0x05,
    RawSignal = 0x80,
}

impl FieldCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FieldCode::Battery),
            0x02 => Some(FieldCode::PoorSignal),
            0x04 => Some(FieldCode::Attention),
            0x05 => Some(FieldCode::Meditation),
            0x80 => Some(FieldCode::RawSignal),
            _ => None,
        }
    }
}

/// Payload length of a RAW field: one big-endian i16.
pub const RAW_PAYLOAD_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressError {
    /// Caller contract violation; the pipeline is now halted.
    RawPayloadLength(usize),
    /// The pipeline halted earlier; the field was dropped.
    Halted,
}

impl fmt::Display for IngressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressError::RawPayloadLength(len) => {
                write!(f, "raw signal payload of {len} bytes, expected {RAW_PAYLOAD_LEN}")
            }
            IngressError::Halted => write!(f, "pipeline halted, field dropped"),
        }
    }
}

impl std::error::Error for IngressError {}

/// Producer handle. The only writer of the ring and session metrics.
#[derive(Clone)]
pub struct IngressAdapter<const N: usize> {
    shared: Arc<SharedAcquisition<N>>,
}

impl<const N: usize> IngressAdapter<N> {
    pub fn new(shared: Arc<SharedAcquisition<N>>) -> Self {
        Self { shared }
    }

    /// Parser callback: one decoded field.
    ///
    /// Only extended code level 0 is processed. Unknown codes are ignored.
    /// A RAW field whose payload is not exactly two bytes halts the pipeline.
    pub fn on_field(
        &self,
        extended_code_level: u8,
        code: u8,
        value: &[u8],
    ) -> Result<(), IngressError> {
        if self.shared.is_halted() {
            return Err(IngressError::Halted);
        }
        if extended_code_level != 0 {
            debug!(extended_code_level, code, len = value.len(), "extended field ignored");
            return Ok(());
        }
        let Some(field) = FieldCode::from_code(code) else {
            return Ok(());
        };

        match field {
            FieldCode::RawSignal => {
                let Ok(bytes) = <[u8; RAW_PAYLOAD_LEN]>::try_from(value) else {
                    let len = value.len();
                    self.shared.halt(HaltReason::RawPayloadLength(len));
                    error!(len, "raw signal payload length violation, halting");
                    return Err(IngressError::RawPayloadLength(len));
                };
                self.shared.record_sample(i16::from_be_bytes(bytes));
            }
            FieldCode::Battery => self.store_scalar(value, |m, v| m.battery_level = v),
            FieldCode::PoorSignal => self.store_scalar(value, |m, v| m.poor_signal = v),
            FieldCode::Attention => self.store_scalar(value, |m, v| m.attention = v),
            FieldCode::Meditation => self.store_scalar(value, |m, v| m.meditation = v),
        }
        Ok(())
    }

    #[inline]
    fn store_scalar(
        &self,
        value: &[u8],
        set: impl FnOnce(&mut SessionMetrics, u8),
    ) {
        if let Some(&v) = value.first() {
            self.shared.update_metrics(|m| set(m, v));
        }
    }
}
