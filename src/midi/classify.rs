use super::nrpn::NrpnController;
use super::RawMidiEvent;

/// Controllers for data increment/decrement and RPN select. Not handled.
const UNSUPPORTED_PARAMETER_CONTROLLERS: [u8; 4] = [96, 97, 100, 101];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    SysEx,
    NrpnFragment {
        channel: u8,
        controller: NrpnController,
        value: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    Other,
}

/// Tag a raw message by status byte and, for Control-Change, controller number.
pub fn classify(event: &RawMidiEvent) -> MessageClass {
    let bytes = event.bytes();
    match bytes {
        [0xF0, ..] => MessageClass::SysEx,
        [status, controller, value, ..] if status & 0xF0 == 0xB0 => {
            let channel = status & 0x0F;
            if let Some(nrpn) = NrpnController::from_cc(*controller) {
                MessageClass::NrpnFragment {
                    channel,
                    controller: nrpn,
                    value: *value,
                }
            } else if UNSUPPORTED_PARAMETER_CONTROLLERS.contains(controller) {
                MessageClass::Other
            } else {
                MessageClass::ControlChange {
                    channel,
                    controller: *controller,
                    value: *value,
                }
            }
        }
        _ => MessageClass::Other,
    }
}
