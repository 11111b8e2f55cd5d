use serde::Deserialize;

use super::field::EventClass;
use crate::error::ValidationIssue;
use crate::midi::{DecodedEvent, ParamSource};

/// A number, an inclusive `{ "min", "max" }` range, or a list of numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Predicate {
    Exact(u16),
    // Listed before `Range`, which would also accept a two-element array.
    AnyOf(Vec<u16>),
    Range { min: u16, max: u16 },
}

impl Predicate {
    pub fn matches(&self, value: u16) -> bool {
        match self {
            Predicate::Exact(v) => *v == value,
            Predicate::Range { min, max } => (*min..=*max).contains(&value),
            Predicate::AnyOf(values) => values.contains(&value),
        }
    }

    fn check(&self, field: &'static str, limit: u16) -> Result<(), ValidationIssue> {
        let bad = |reason: String| -> Result<(), ValidationIssue> {
            Err(ValidationIssue::BadPredicate { field, reason })
        };
        match self {
            Predicate::Exact(v) if *v > limit => bad(format!("{} exceeds {}", v, limit)),
            Predicate::Range { min, max } if min > max => bad(format!("empty range {}..={}", min, max)),
            Predicate::Range { max, .. } if *max > limit => bad(format!("{} exceeds {}", max, limit)),
            Predicate::AnyOf(values) if values.is_empty() => bad("empty list".to_string()),
            Predicate::AnyOf(values) => match values.iter().find(|v| **v > limit) {
                Some(v) => bad(format!("{} exceeds {}", v, limit)),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

fn check_opt(pred: &Option<Predicate>, field: &'static str, limit: u16) -> Result<(), ValidationIssue> {
    pred.as_ref().map_or(Ok(()), |p| p.check(field, limit))
}

fn opt_matches(pred: &Option<Predicate>, value: u16) -> bool {
    pred.as_ref().map_or(true, |p| p.matches(value))
}

/// Positional byte predicates; `null` entries match anything.
fn bytes_match(preds: &[Option<Predicate>], bytes: &[u8]) -> bool {
    preds.iter().enumerate().all(|(i, pred)| match pred {
        None => true,
        Some(p) => bytes.get(i).is_some_and(|b| p.matches(*b as u16)),
    })
}

/// What a template entry reacts to, one variant per [`DecodedEvent`] shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "class", deny_unknown_fields)]
pub enum Pattern {
    #[serde(rename = "parameter_change")]
    ParameterChange {
        source: Option<ParamSource>,
        channel: Option<Predicate>,
        parameter: Option<Predicate>,
        parameter_msb: Option<Predicate>,
        parameter_lsb: Option<Predicate>,
        value: Option<Predicate>,
    },
    #[serde(rename = "sysex")]
    SysEx {
        manufacturer: Option<Vec<u8>>,
        device: Option<Vec<u8>>,
        #[serde(default)]
        body: Vec<Option<Predicate>>,
    },
    #[serde(rename = "other")]
    Other {
        status: Option<Predicate>,
        #[serde(default)]
        data: Vec<Option<Predicate>>,
    },
}

impl Pattern {
    pub fn class(&self) -> EventClass {
        match self {
            Pattern::ParameterChange { .. } => EventClass::ParameterChange,
            Pattern::SysEx { .. } => EventClass::SysEx,
            Pattern::Other { .. } => EventClass::Other,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationIssue> {
        match self {
            Pattern::ParameterChange {
                channel,
                parameter,
                parameter_msb,
                parameter_lsb,
                value,
                ..
            } => {
                check_opt(channel, "channel", 15)?;
                check_opt(parameter, "parameter", 0x3FFF)?;
                check_opt(parameter_msb, "parameter_msb", 0x7F)?;
                check_opt(parameter_lsb, "parameter_lsb", 0x7F)?;
                check_opt(value, "value", 0x3FFF)
            }
            Pattern::SysEx {
                manufacturer,
                device,
                body,
            } => {
                for (field, bytes) in [("manufacturer", manufacturer), ("device", device)] {
                    if bytes.as_ref().is_some_and(|b| b.iter().any(|x| *x > 0x7F)) {
                        return Err(ValidationIssue::BadPredicate {
                            field,
                            reason: "SysEx data bytes are 7-bit".to_string(),
                        });
                    }
                }
                body.iter().try_for_each(|p| check_opt(p, "body", 0x7F))
            }
            Pattern::Other { status, data } => {
                check_opt(status, "status", 0xFF)?;
                data.iter().try_for_each(|p| check_opt(p, "data", 0x7F))
            }
        }
    }

    pub fn matches(&self, event: &DecodedEvent) -> bool {
        match (self, event) {
            (
                Pattern::ParameterChange {
                    source,
                    channel,
                    parameter,
                    parameter_msb,
                    parameter_lsb,
                    value,
                },
                DecodedEvent::ParameterChange(pc),
            ) => {
                source.map_or(true, |s| s == pc.source)
                    && opt_matches(channel, pc.channel as u16)
                    && opt_matches(parameter, pc.parameter)
                    && opt_matches(parameter_msb, pc.parameter >> 7)
                    && opt_matches(parameter_lsb, pc.parameter & 0x7F)
                    && opt_matches(value, pc.value)
            }
            (
                Pattern::SysEx {
                    manufacturer,
                    device,
                    body,
                },
                DecodedEvent::SysEx(cmd),
            ) => {
                manufacturer.as_ref().map_or(true, |m| *m == cmd.manufacturer)
                    && device.as_ref().map_or(true, |d| *d == cmd.device)
                    && bytes_match(body, &cmd.body)
            }
            (Pattern::Other { status, data }, DecodedEvent::Other(msg)) => {
                opt_matches(status, msg.status as u16) && bytes_match(data, &msg.data)
            }
            _ => false,
        }
    }
}
