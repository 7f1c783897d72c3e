//! Headset session: reset metrics to baseline and ask the dongle to connect.

use std::io;
use std::time::Instant;

use tracing::info;

use super::SharedAcquisition;

/// Byte the USB dongle interprets as "connect to any headset".
pub const CONNECT_REQUEST: u8 = 0xC2;

/// Byte-level link to the headset dongle (UART on the target).
pub trait DongleLink {
    fn transmit(&mut self, byte: u8) -> io::Result<()>;
}

impl<W: io::Write> DongleLink for W {
    fn transmit(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])?;
        self.flush()
    }
}

/// One connect request and the moment it was issued.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: uuid::Uuid,
    pub connected_at: Instant,
}

impl<const N: usize> SharedAcquisition<N> {
    /// Reset session metrics, then send the connect request exactly once.
    /// Callers go through `Pipeline::connect`, which refuses once halted.
    pub(crate) fn connect_session<L: DongleLink>(&self, link: &mut L) -> io::Result<Session> {
        self.reset_metrics();
        link.transmit(CONNECT_REQUEST)?;
        let session = Session {
            id: uuid::Uuid::new_v4(),
            connected_at: Instant::now(),
        };
        info!(session_id = %session.id, "headset connect requested");
        Ok(session)
    }
}
