//! Event fields that templates can read, and the `{field|table}` text syntax.

use std::collections::HashMap;
use std::fmt;

use crate::error::ValidationIssue;
use crate::midi::DecodedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    ParameterChange,
    SysEx,
    Other,
}

impl EventClass {
    pub fn of(event: &DecodedEvent) -> Self {
        match event {
            DecodedEvent::ParameterChange(_) => EventClass::ParameterChange,
            DecodedEvent::SysEx(_) => EventClass::SysEx,
            DecodedEvent::Other(_) => EventClass::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventClass::ParameterChange => "parameter_change",
            EventClass::SysEx => "sysex",
            EventClass::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Bytes,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Channel,
    Parameter,
    ParameterMsb,
    ParameterLsb,
    Value,
    ValueMsb,
    ValueLsb,
    /// Value scaled to 0.0..=1.0 by the source's value width.
    ValueNormalized,
    Manufacturer,
    Device,
    Body,
    BodyLen,
    BodyByte(usize),
    /// Body bytes from the index on, as text, trailing NULs removed.
    BodyText(usize),
    Status,
    DataByte(usize),
}

impl Field {
    pub fn parse(name: &str) -> Option<Field> {
        let name = name.trim();
        if let Some((base, rest)) = name.split_once('[') {
            let index: usize = rest.strip_suffix(']')?.trim().parse().ok()?;
            return match base.trim() {
                "body" => Some(Field::BodyByte(index)),
                "body_text" => Some(Field::BodyText(index)),
                "data" => Some(Field::DataByte(index)),
                _ => None,
            };
        }
        Some(match name {
            "channel" => Field::Channel,
            "parameter" => Field::Parameter,
            "parameter_msb" => Field::ParameterMsb,
            "parameter_lsb" => Field::ParameterLsb,
            "value" => Field::Value,
            "value_msb" => Field::ValueMsb,
            "value_lsb" => Field::ValueLsb,
            "value_normalized" => Field::ValueNormalized,
            "manufacturer" => Field::Manufacturer,
            "device" => Field::Device,
            "body" => Field::Body,
            "body_len" => Field::BodyLen,
            "body_text" => Field::BodyText(0),
            "status" => Field::Status,
            _ => return None,
        })
    }

    pub fn class(self) -> EventClass {
        use Field::*;
        match self {
            Channel | Parameter | ParameterMsb | ParameterLsb | Value | ValueMsb | ValueLsb
            | ValueNormalized => EventClass::ParameterChange,
            Manufacturer | Device | Body | BodyLen | BodyByte(_) | BodyText(_) => EventClass::SysEx,
            Status | DataByte(_) => EventClass::Other,
        }
    }

    pub fn kind(self) -> FieldKind {
        use Field::*;
        match self {
            ValueNormalized => FieldKind::Float,
            Manufacturer | Device | Body => FieldKind::Bytes,
            BodyText(_) => FieldKind::Text,
            _ => FieldKind::Int,
        }
    }

    /// Read the field. `None` when the event is of another class or a byte
    /// index lies past the end of the message.
    pub fn extract(self, event: &DecodedEvent) -> Option<FieldValue> {
        use Field::*;
        match event {
            DecodedEvent::ParameterChange(pc) => Some(match self {
                Channel => FieldValue::Int(pc.channel as i64),
                Parameter => FieldValue::Int(pc.parameter as i64),
                ParameterMsb => FieldValue::Int((pc.parameter >> 7) as i64),
                ParameterLsb => FieldValue::Int((pc.parameter & 0x7F) as i64),
                Value => FieldValue::Int(pc.value as i64),
                ValueMsb => FieldValue::Int((pc.value >> 7) as i64),
                ValueLsb => FieldValue::Int((pc.value & 0x7F) as i64),
                ValueNormalized => {
                    FieldValue::Float(pc.value as f32 / pc.source.value_max() as f32)
                }
                _ => return None,
            }),
            DecodedEvent::SysEx(cmd) => Some(match self {
                Manufacturer => FieldValue::Bytes(cmd.manufacturer.clone()),
                Device => FieldValue::Bytes(cmd.device.clone()),
                Body => FieldValue::Bytes(cmd.body.clone()),
                BodyLen => FieldValue::Int(cmd.body.len() as i64),
                BodyByte(i) => FieldValue::Int(*cmd.body.get(i)? as i64),
                BodyText(i) => {
                    let bytes = cmd.body.get(i..)?;
                    let text = String::from_utf8_lossy(bytes);
                    FieldValue::Text(text.trim_end_matches('\0').to_string())
                }
                _ => return None,
            }),
            DecodedEvent::Other(msg) => Some(match self {
                Status => FieldValue::Int(msg.status as i64),
                DataByte(i) => FieldValue::Int(*msg.data.get(i)? as i64),
                _ => return None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f32),
    Bytes(Vec<u8>),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bytes(bytes) => bytes.iter().try_for_each(|b| write!(f, "{:02x}", b)),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Integer to text mapping, e.g. Qu channel ids to display names.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    pub entries: HashMap<i64, String>,
    pub default: Option<String>,
}

impl LookupTable {
    pub fn lookup(&self, key: i64) -> Option<&str> {
        self.entries
            .get(&key)
            .or(self.default.as_ref())
            .map(String::as_str)
    }
}

pub type Tables = HashMap<String, LookupTable>;

/// `{field}` or `{field|table}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub field: Field,
    pub table: Option<String>,
}

impl Placeholder {
    pub fn parse(inner: &str) -> Result<Self, ValidationIssue> {
        let (name, table) = match inner.split_once('|') {
            Some((name, table)) => (name, Some(table.trim().to_string())),
            None => (inner, None),
        };
        let field = Field::parse(name).ok_or_else(|| ValidationIssue::UnknownField(name.trim().to_string()))?;
        Ok(Self { field, table })
    }

    fn render(&self, event: &DecodedEvent, tables: &Tables) -> Option<String> {
        let value = self.field.extract(event)?;
        match (&self.table, value) {
            (None, value) => Some(value.to_string()),
            (Some(table), FieldValue::Int(key)) => tables.get(table)?.lookup(key).map(str::to_string),
            (Some(_), _) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(Placeholder),
}

/// Text with embedded placeholders, used for OSC addresses and string args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTemplate {
    segments: Vec<Segment>,
}

impl TextTemplate {
    pub fn parse(source: &str) -> Result<Self, ValidationIssue> {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find(|c: char| c == '{' || c == '}') {
            if rest[open..].starts_with('}') {
                return Err(ValidationIssue::BadPlaceholder(source.to_string()));
            }
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| ValidationIssue::BadPlaceholder(source.to_string()))?;
            let inner = &after[..close];
            if inner.contains('{') || inner.trim().is_empty() {
                return Err(ValidationIssue::BadPlaceholder(source.to_string()));
            }
            segments.push(Segment::Value(Placeholder::parse(inner)?));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn single(placeholder: Placeholder) -> Self {
        Self {
            segments: vec![Segment::Value(placeholder)],
        }
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Value(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// Literal text before the first placeholder.
    pub fn literal_prefix(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Literal(s)) => s,
            _ => "",
        }
    }

    pub fn render(&self, event: &DecodedEvent, tables: &Tables) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Value(p) => out.push_str(&p.render(event, tables)?),
            }
        }
        Some(out)
    }
}
