//! MIDI Transport: opens a named input/output port pair and shuttles raw
//! SysEx frames. Expressed as a trait so the Transaction Layer and tests are
//! not coupled to a concrete MIDI backend.

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{Error, Result};

/// Receives one complete inbound SysEx frame at a time.
pub trait InboundSink: Send + 'static {
    fn on_frame(&self, frame: &[u8]);
}

impl<F: Fn(&[u8]) + Send + 'static> InboundSink for F {
    fn on_frame(&self, frame: &[u8]) {
        self(frame)
    }
}

/// A MIDI in/out port pair carrying SysEx frames.
pub trait MidiTransport: Send {
    /// Sends one complete SysEx frame (including `F0`/`F7`).
    fn send(&self, frame: &[u8]) -> Result<()>;
}

/// Production backend, built on `midir`. Opens the first input and output
/// port whose display name starts with the given prefix.
pub struct MidirTransport {
    output: Mutex<midir::MidiOutputConnection>,
    // Kept alive so the input callback continues to fire; never read again.
    _input: midir::MidiInputConnection<()>,
}

impl MidirTransport {
    pub fn open(port_prefix: &str, sink: impl InboundSink) -> Result<Self> {
        let midi_in = midir::MidiInput::new("gt1000-core-in")?;
        let midi_out = midir::MidiOutput::new("gt1000-core-out")?;

        let in_port = find_port(&midi_in.ports(), |p| midi_in.port_name(p).ok(), port_prefix)?;
        let out_port = find_port(&midi_out.ports(), |p| midi_out.port_name(p).ok(), port_prefix)?;

        let sink = Arc::new(sink);
        let input = midi_in.connect(
            &in_port,
            "gt1000-core-in",
            move |_stamp, message, _| {
                if message.first() == Some(&0xF0) {
                    sink.on_frame(message);
                } else {
                    debug!("ignoring non-sysex inbound message: {message:02x?}");
                }
            },
            (),
        )?;

        let output = midi_out.connect(&out_port, "gt1000-core-out")?;

        Ok(Self {
            output: Mutex::new(output),
            _input: input,
        })
    }
}

impl MidiTransport for MidirTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        self.output.lock().expect("midi output mutex poisoned").send(frame)?;
        Ok(())
    }
}

fn find_port<T: Clone>(
    ports: &[T],
    name_of: impl Fn(&T) -> Option<String>,
    prefix: &str,
) -> Result<T> {
    ports
        .iter()
        .find(|p| name_of(p).map(|n| n.starts_with(prefix)).unwrap_or(false))
        .cloned()
        .ok_or_else(|| Error::PortNotFound(prefix.to_string()))
}

/// Lists the display names of every available MIDI output port, for the
/// `list-ports` front-end command.
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = midir::MidiOutput::new("gt1000-core-list").map_err(|e| Error::PortOpenFailed(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}

/// In-memory transport used by tests: records every frame sent, and lets
/// the test inject inbound frames synchronously via `inject`.
#[derive(Clone)]
pub struct FakeTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    sink: Arc<Mutex<Option<Arc<dyn InboundSink>>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_sink(&self, sink: impl InboundSink) {
        *self.sink.lock().expect("sink mutex poisoned") = Some(Arc::new(sink));
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }

    /// Delivers `frame` to the registered inbound sink, as if the device had
    /// just sent it.
    pub fn inject(&self, frame: &[u8]) {
        let sink = self.sink.lock().expect("sink mutex poisoned").clone();
        match sink {
            Some(sink) => sink.on_frame(frame),
            None => warn!("FakeTransport::inject called before a sink was registered"),
        }
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiTransport for FakeTransport {
    fn send(&self, frame: &[u8]) -> Result<()> {
        self.sent.lock().expect("sent mutex poisoned").push(frame.to_vec());
        Ok(())
    }
}
