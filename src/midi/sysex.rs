//! Manufacturer-specific SysEx framing.
//!
//! Only the envelope is interpreted here: manufacturer id, a fixed-length
//! device identifier, then the command body. What the body means is left to
//! the templates, since the mixer's command set is large and only partly
//! documented.

use serde::Deserialize;

use super::SysExCommand;
use crate::error::DecodeError;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Allen & Heath extended manufacturer id.
pub const ALLEN_HEATH_ID: [u8; 3] = [0x00, 0x00, 0x1A];
/// Universal Real-Time (MMC and friends).
pub const UNIVERSAL_REALTIME_ID: [u8; 1] = [0x7F];

/// One accepted SysEx envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SysExLayout {
    pub manufacturer: Vec<u8>,
    /// Bytes between the manufacturer id and the command body.
    pub device_id_len: usize,
}

impl SysExLayout {
    /// Allen & Heath Qu header (`50 11 01 00`) and Universal Real-Time.
    pub fn defaults() -> Vec<SysExLayout> {
        vec![
            SysExLayout {
                manufacturer: ALLEN_HEATH_ID.to_vec(),
                device_id_len: 4,
            },
            SysExLayout {
                manufacturer: UNIVERSAL_REALTIME_ID.to_vec(),
                device_id_len: 1,
            },
        ]
    }

    /// Manufacturer id, device id and at least one body byte.
    pub fn min_len(&self) -> usize {
        self.manufacturer.len() + self.device_id_len + 1
    }
}

#[derive(Debug, Clone)]
pub struct SysExDecoder {
    layouts: Vec<SysExLayout>,
}

impl SysExDecoder {
    pub fn new(layouts: Vec<SysExLayout>) -> Self {
        Self { layouts }
    }

    pub fn decode(&self, payload: &[u8]) -> Result<SysExCommand, DecodeError> {
        let inner = strip_framing(payload);
        let mut truncated: Option<DecodeError> = None;

        for layout in &self.layouts {
            let id = layout.manufacturer.as_slice();
            if inner.starts_with(id) {
                if inner.len() < layout.min_len() {
                    return Err(DecodeError::Truncated {
                        expected: layout.min_len(),
                        actual: inner.len(),
                    });
                }
                let (device, body) = inner[id.len()..].split_at(layout.device_id_len);
                return Ok(SysExCommand {
                    manufacturer: id.to_vec(),
                    device: device.to_vec(),
                    body: body.to_vec(),
                });
            }
            if id.starts_with(inner) && truncated.is_none() {
                truncated = Some(DecodeError::Truncated {
                    expected: layout.min_len(),
                    actual: inner.len(),
                });
            }
        }

        Err(truncated.unwrap_or_else(|| DecodeError::UnrecognizedManufacturer {
            prefix: inner.iter().take(3).copied().collect(),
        }))
    }
}

fn strip_framing(payload: &[u8]) -> &[u8] {
    let payload = payload.strip_prefix(&[SYSEX_START]).unwrap_or(payload);
    payload.strip_suffix(&[SYSEX_END]).unwrap_or(payload)
}
