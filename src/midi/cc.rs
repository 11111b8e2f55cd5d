use super::{ParamSource, ParameterChange};

/// Map a plain Control-Change straight to a parameter change.
pub fn handle(channel: u8, controller: u8, value: u8) -> ParameterChange {
    ParameterChange {
        channel: channel & 0x0F,
        parameter: controller as u16,
        value: (value & 0x7F) as u16,
        source: ParamSource::ControlChange,
    }
}
