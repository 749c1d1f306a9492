//! Transaction Layer: issues DT1/RQ1 frames and correlates replies by
//! echoed address against a request in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::sysex::{self, ParsedFrame};
use crate::transport::MidiTransport;

const RETRY_COUNT: u32 = 100;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type PendingMap = HashMap<[u8; 4], Option<Vec<u8>>>;

/// Shared correlation state fed by the transport's inbound callback: the
/// fetch/set reply map (M_pending) plus the one-shot identity reply the
/// handshake's broadcast phase waits on.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<PendingMap>,
    identity: Mutex<Option<(u8, u8, u8)>>,
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Parses `frame` and deposits it into whichever correlation slot it
    /// answers. Called from the transport's inbound callback; must never
    /// block on anything but these short-lived locks.
    pub fn on_inbound_frame(&self, frame: &[u8]) {
        match sysex::parse(frame) {
            ParsedFrame::DataSet { address, body, .. } => {
                trace!("inbound DT1 for {address:02x?}, {} byte body", body.len());
                self.pending.lock().expect("pending mutex poisoned").insert(address, Some(body));
            }
            ParsedFrame::IdentityReply {
                device_id,
                software_rev_1,
                software_rev_3,
            } => {
                *self.identity.lock().expect("identity mutex poisoned") =
                    Some((device_id, software_rev_1, software_rev_3));
            }
            ParsedFrame::Other => {}
            ParsedFrame::Malformed => debug!("dropped malformed inbound frame"),
        }
    }

    pub fn take_identity(&self) -> Option<(u8, u8, u8)> {
        self.identity.lock().expect("identity mutex poisoned").take()
    }
}

/// Issues reads and writes against a device and correlates asynchronous
/// replies. All sends are serialised behind `wire` (M_wire); the
/// correlation map is guarded by its own short-lived lock (M_pending).
pub struct Transaction {
    transport: Arc<dyn MidiTransport>,
    device_id: u8,
    correlator: Arc<Correlator>,
    wire: Mutex<()>,
}

impl Transaction {
    pub fn new(transport: Arc<dyn MidiTransport>, device_id: u8, correlator: Arc<Correlator>) -> Self {
        Self {
            transport,
            device_id,
            correlator,
            wire: Mutex::new(()),
        }
    }

    pub fn set_device_id(&mut self, device_id: u8) {
        self.device_id = device_id;
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    /// Reads `length` bytes starting at `addr`. Polls at a 100 ms cadence up
    /// to `RETRY_COUNT` times (~10 s); returns `Timeout` if nothing arrives.
    pub fn fetch(&self, addr: [u8; 4], length: u32, override_cksum: Option<u8>) -> Result<Vec<u8>> {
        let frame = {
            let _wire = self.wire.lock().expect("wire mutex poisoned");
            self.correlator.pending.lock().expect("pending mutex poisoned").insert(addr, None);
            let frame = sysex::build_rq(self.device_id, addr, length.to_be_bytes(), override_cksum);
            self.transport.send(&frame)?;
            frame
        };
        trace!("sent RQ1 {frame:02x?}");
        self.poll(addr)
    }

    /// Writes `bytes` at `addr`; fire-and-forget, does not wait for an echo.
    pub fn set(&self, addr: [u8; 4], bytes: &[u8]) -> Result<()> {
        let _wire = self.wire.lock().expect("wire mutex poisoned");
        self.correlator.pending.lock().expect("pending mutex poisoned").insert(addr, None);
        let frame = sysex::build_dt(self.device_id, addr, bytes, None);
        self.transport.send(&frame)?;
        trace!("sent DT1 {frame:02x?}");
        Ok(())
    }

    /// Writes `bytes` at `addr`, then waits for the device's echo of that
    /// address, as the editor-mode handshake's second probe requires.
    pub fn set_and_wait(&self, addr: [u8; 4], bytes: &[u8]) -> Result<Vec<u8>> {
        self.set(addr, bytes)?;
        self.poll(addr)
    }

    fn poll(&self, addr: [u8; 4]) -> Result<Vec<u8>> {
        for _ in 0..RETRY_COUNT {
            thread::sleep(POLL_INTERVAL);
            let got = self
                .correlator
                .pending
                .lock()
                .expect("pending mutex poisoned")
                .get(&addr)
                .cloned();
            if let Some(Some(body)) = got {
                return Ok(body);
            }
        }
        warn!("timed out waiting for a reply at {addr:02x?}");
        Err(Error::Timeout)
    }
}
