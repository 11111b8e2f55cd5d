use std::io::{stdin, stdout, Write};

use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};

use crate::config::MidiOptions;
use crate::error::{Error, Result};
use crate::general::queue::QueueProducer;
use crate::midi::framer::MessageFramer;
use crate::midi::RawMidiEvent;

/// Select a MIDI input port. First tries to find a port whose name contains
/// `input_port_name_substr`. If no match is found and there are multiple ports,
/// prompts the user to choose one interactively.
pub fn choose_input_port(midi_in: &MidiInput, input_port_name_substr: &str) -> Result<usize> {
    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(Error::MidiPort("no input port found".to_string()));
    }

    if !input_port_name_substr.is_empty() {
        for (i, p) in ports.iter().enumerate() {
            if let Ok(name) = midi_in.port_name(p) {
                if name.contains(input_port_name_substr) {
                    info!(target: "midi", "choosing input port matching '{}': {}", input_port_name_substr, name);
                    return Ok(i);
                }
            }
        }
    }

    if ports.len() == 1 {
        info!(target: "midi", "choosing the only available input port: {}", midi_in.port_name(&ports[0])?);
        return Ok(0);
    }

    println!("\nAvailable input ports:");
    for (i, p) in ports.iter().enumerate() {
        println!("{}: {}", i, midi_in.port_name(p)?);
    }

    print!("Please select input port: ");
    stdout().flush()?;
    let mut choice = String::new();
    stdin().read_line(&mut choice)?;
    choice
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|idx| *idx < ports.len())
        .ok_or_else(|| Error::MidiPort(format!("invalid input port selected: '{}'", choice.trim())))
}

/// State owned by the driver callback.
pub struct InputState {
    framer: MessageFramer,
    producer: QueueProducer,
}

impl InputState {
    pub fn new(max_sysex_len: usize, producer: QueueProducer) -> Self {
        Self {
            framer: MessageFramer::new(max_sysex_len),
            producer,
        }
    }

    /// Frame one driver chunk and queue the complete messages.
    pub fn on_chunk(&mut self, timestamp_us: u64, chunk: &[u8]) {
        let producer = &self.producer;
        self.framer
            .feed(chunk, |bytes| producer.push(RawMidiEvent::new(bytes, timestamp_us)));
    }
}

/// Open input connection. Closing it drops the queue producer, which is the
/// decoding worker's signal to drain and stop.
pub struct MidiInputHandle {
    conn: MidiInputConnection<InputState>,
    port_name: String,
}

impl MidiInputHandle {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn close(self) {
        let (_midi_in, state) = self.conn.close();
        if state.framer.discarded() > 0 {
            info!(target: "midi", "{} incomplete SysEx messages were discarded", state.framer.discarded());
        }
        debug!(target: "midi", "input '{}' closed", self.port_name);
    }
}

pub fn open_input(app_name: &str, options: &MidiOptions, producer: QueueProducer) -> Result<MidiInputHandle> {
    let mut midi_in = MidiInput::new(&format!("{} input", app_name))?;
    midi_in.ignore(if options.sysex_disable {
        Ignore::All
    } else {
        Ignore::TimeAndActiveSense
    });

    let idx = choose_input_port(&midi_in, &options.control_port_name)?;
    let ports = midi_in.ports();
    let port = ports
        .get(idx)
        .ok_or_else(|| Error::MidiPort("input port disappeared".to_string()))?;
    let port_name = midi_in.port_name(port)?;

    let state = InputState::new(options.max_sysex_len, producer);
    let conn = midi_in.connect(
        port,
        &format!("{}-read-input", app_name),
        |stamp, message, state: &mut InputState| state.on_chunk(stamp, message),
        state,
    )?;
    info!(target: "midi", "listening on '{}'", port_name);
    Ok(MidiInputHandle { conn, port_name })
}
