//! MIDI decoding: raw transport bytes in, [`DecodedEvent`]s out.

pub mod cc;
pub mod classify;
pub mod framer;
pub mod nrpn;
pub mod sysex;

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::DecodeError;
use classify::MessageClass;
use nrpn::{NrpnAssembler, NrpnAssemblyState};
use sysex::{SysExDecoder, SysExLayout};

/// Number of MIDI channels, and of NRPN assembly slots.
pub const CHANNELS: usize = 16;

/// A complete MIDI message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMidiEvent {
    bytes: Vec<u8>,
    /// Driver timestamp in microseconds (driver-specific epoch).
    timestamp_us: u64,
    received_at: Instant,
}

impl RawMidiEvent {
    pub fn new(bytes: Vec<u8>, timestamp_us: u64) -> Self {
        Self::received_at(bytes, timestamp_us, Instant::now())
    }

    pub fn received_at(bytes: Vec<u8>, timestamp_us: u64, received_at: Instant) -> Self {
        Self {
            bytes,
            timestamp_us,
            received_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn arrival(&self) -> Instant {
        self.received_at
    }

    pub fn status(&self) -> Option<u8> {
        self.bytes.first().copied()
    }

    /// Channel of a channel-voice message; `None` for system messages.
    pub fn channel(&self) -> Option<u8> {
        match self.status()? {
            s @ 0x80..=0xEF => Some(s & 0x0F),
            _ => None,
        }
    }
}

/// Where a [`ParameterChange`] came from; decides the value width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    /// Four-message NRPN sequence, 14-bit value.
    Nrpn,
    /// Single Control-Change, 7-bit value.
    ControlChange,
}

impl ParamSource {
    pub fn value_max(self) -> u16 {
        match self {
            ParamSource::Nrpn => 0x3FFF,
            ParamSource::ControlChange => 0x7F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterChange {
    pub channel: u8,
    /// 14-bit parameter number (`msb << 7 | lsb`); the controller number for CC.
    pub parameter: u16,
    pub value: u16,
    pub source: ParamSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExCommand {
    pub manufacturer: Vec<u8>,
    pub device: Vec<u8>,
    pub body: Vec<u8>,
}

/// Anything that is neither SysEx nor a Control-Change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherMessage {
    pub status: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    SysEx(SysExCommand),
    ParameterChange(ParameterChange),
    Other(OtherMessage),
}

impl DecodedEvent {
    pub fn class_name(&self) -> &'static str {
        match self {
            DecodedEvent::SysEx(_) => "sysex",
            DecodedEvent::ParameterChange(_) => "parameter_change",
            DecodedEvent::Other(_) => "other",
        }
    }
}

/// Classifier plus the three decoders, holding the per-channel NRPN state.
///
/// Owned by exactly one decoding worker, so the assembly state needs no
/// locking.
pub struct MidiDecoder {
    sysex: SysExDecoder,
    assembler: NrpnAssembler,
    nrpn_state: [NrpnAssemblyState; CHANNELS],
}

impl MidiDecoder {
    pub fn new(layouts: Vec<SysExLayout>, nrpn_timeout: Duration) -> Self {
        Self {
            sysex: SysExDecoder::new(layouts),
            assembler: NrpnAssembler::new(nrpn_timeout),
            nrpn_state: Default::default(),
        }
    }

    /// Decode one event. `Ok(None)` means the event was consumed without
    /// producing anything yet (an NRPN fragment, an empty message).
    pub fn decode(&mut self, event: &RawMidiEvent) -> Result<Option<DecodedEvent>, DecodeError> {
        match classify::classify(event) {
            MessageClass::SysEx => self.sysex.decode(event.bytes()).map(|cmd| Some(DecodedEvent::SysEx(cmd))),
            MessageClass::NrpnFragment {
                channel,
                controller,
                value,
            } => {
                let state = &mut self.nrpn_state[channel as usize];
                Ok(self
                    .assembler
                    .feed(state, channel, controller, value, event.arrival())
                    .map(DecodedEvent::ParameterChange))
            }
            MessageClass::ControlChange {
                channel,
                controller,
                value,
            } => Ok(Some(DecodedEvent::ParameterChange(cc::handle(
                channel, controller, value,
            )))),
            MessageClass::Other => Ok(event.status().map(|status| {
                DecodedEvent::Other(OtherMessage {
                    status,
                    data: event.bytes()[1..].to_vec(),
                })
            })),
        }
    }

    /// Discard NRPN fragments that have been idle longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> usize {
        self.assembler.expire(&mut self.nrpn_state, now)
    }

    pub fn nrpn_state(&self, channel: u8) -> &NrpnAssemblyState {
        &self.nrpn_state[channel as usize & 0x0F]
    }
}
