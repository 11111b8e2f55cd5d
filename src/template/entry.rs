//! Compiled template entries and the load-time checks that build them.

use rosc::{OscMessage, OscType};
use serde::Deserialize;
use serde_json::Value;

use super::field::{EventClass, Field, FieldKind, Placeholder, Tables, TextTemplate};
use super::pattern::Pattern;
use crate::error::ValidationIssue;
use crate::midi::DecodedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    Int,
    Float,
    String,
    Blob,
}

impl ArgKind {
    fn name(self) -> &'static str {
        match self {
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::String => "string",
            ArgKind::Blob => "blob",
        }
    }
}

/// One argument as written in the template file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgSpec {
    #[serde(rename = "type")]
    pub kind: ArgKind,
    pub field: Option<String>,
    pub value: Option<Value>,
    pub format: Option<String>,
}

/// One template as written in the template file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySpec {
    pub name: Option<String>,
    #[serde(rename = "match")]
    pub pattern: Pattern,
    pub address: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgTemplate {
    Literal(OscType),
    Int(Field),
    Float(Field),
    Blob(Field),
    Text(TextTemplate),
}

impl ArgTemplate {
    fn compile(index: usize, spec: &ArgSpec) -> Result<Self, ValidationIssue> {
        let bad = |reason: &str| ValidationIssue::BadArgument {
            index,
            reason: reason.to_string(),
        };
        let sources = spec.field.is_some() as u8 + spec.value.is_some() as u8 + spec.format.is_some() as u8;
        if sources != 1 {
            return Err(bad("needs exactly one of 'field', 'value' or 'format'"));
        }

        if let Some(value) = &spec.value {
            return literal(spec.kind, value).map(ArgTemplate::Literal).ok_or_else(|| {
                bad(&format!("literal {} is not a valid {}", value, spec.kind.name()))
            });
        }

        if let Some(format) = &spec.format {
            if spec.kind != ArgKind::String {
                return Err(bad("'format' is only allowed on string arguments"));
            }
            return TextTemplate::parse(format).map(ArgTemplate::Text);
        }

        let source = spec.field.as_deref().unwrap_or_default();
        if spec.kind == ArgKind::String {
            return Placeholder::parse(source).map(|p| ArgTemplate::Text(TextTemplate::single(p)));
        }
        if source.contains('|') {
            return Err(bad("lookup tables are only allowed on string arguments"));
        }
        let field = Field::parse(source).ok_or_else(|| ValidationIssue::UnknownField(source.trim().to_string()))?;
        let compatible = match spec.kind {
            ArgKind::Int => field.kind() == FieldKind::Int,
            ArgKind::Float => matches!(field.kind(), FieldKind::Int | FieldKind::Float),
            ArgKind::Blob => field.kind() == FieldKind::Bytes,
            ArgKind::String => true,
        };
        if !compatible {
            return Err(ValidationIssue::TypeMismatch {
                arg: spec.kind.name(),
                field: source.trim().to_string(),
            });
        }
        Ok(match spec.kind {
            ArgKind::Int => ArgTemplate::Int(field),
            ArgKind::Float => ArgTemplate::Float(field),
            _ => ArgTemplate::Blob(field),
        })
    }

    fn fields(&self) -> Vec<(Field, Option<&str>)> {
        match self {
            ArgTemplate::Literal(_) => Vec::new(),
            ArgTemplate::Int(f) | ArgTemplate::Float(f) | ArgTemplate::Blob(f) => vec![(*f, None)],
            ArgTemplate::Text(t) => t.placeholders().map(|p| (p.field, p.table.as_deref())).collect(),
        }
    }

    fn render(&self, event: &DecodedEvent, tables: &Tables) -> Option<OscType> {
        use super::field::FieldValue;
        match self {
            ArgTemplate::Literal(v) => Some(v.clone()),
            ArgTemplate::Int(f) => match f.extract(event)? {
                FieldValue::Int(v) => i32::try_from(v).ok().map(OscType::Int),
                _ => None,
            },
            ArgTemplate::Float(f) => match f.extract(event)? {
                FieldValue::Int(v) => Some(OscType::Float(v as f32)),
                FieldValue::Float(v) => Some(OscType::Float(v)),
                _ => None,
            },
            ArgTemplate::Blob(f) => match f.extract(event)? {
                FieldValue::Bytes(b) => Some(OscType::Blob(b)),
                _ => None,
            },
            ArgTemplate::Text(t) => t.render(event, tables).map(OscType::String),
        }
    }
}

fn literal(kind: ArgKind, value: &Value) -> Option<OscType> {
    match kind {
        ArgKind::Int => value.as_i64().and_then(|v| i32::try_from(v).ok()).map(OscType::Int),
        ArgKind::Float => value.as_f64().map(|v| OscType::Float(v as f32)),
        ArgKind::String => value.as_str().map(|s| OscType::String(s.to_string())),
        ArgKind::Blob => value
            .as_array()?
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(OscType::Blob),
    }
}

/// A validated template: pattern, OSC address, argument list.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    name: String,
    pattern: Pattern,
    address: TextTemplate,
    args: Vec<ArgTemplate>,
}

impl TemplateEntry {
    /// Check every field reference against the pattern's event class and
    /// the known lookup tables.
    pub fn compile(spec: EntrySpec, tables: &Tables, fallback_name: String) -> Result<Self, ValidationIssue> {
        spec.pattern.validate()?;
        let class = spec.pattern.class();

        let address = TextTemplate::parse(&spec.address)?;
        if !address.literal_prefix().starts_with('/') {
            return Err(ValidationIssue::BadAddress(spec.address));
        }
        let args = spec
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| ArgTemplate::compile(i, a))
            .collect::<Result<Vec<_>, _>>()?;

        let address_refs = address.placeholders().map(|p| (p.field, p.table.as_deref()));
        let arg_refs = args.iter().flat_map(ArgTemplate::fields);
        for (field, table) in address_refs.chain(arg_refs) {
            check_field(field, table, class, tables)?;
        }

        Ok(Self {
            name: spec.name.unwrap_or(fallback_name),
            pattern: spec.pattern,
            address,
            args,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, event: &DecodedEvent) -> bool {
        self.pattern.matches(event)
    }

    /// Fill in the templates. `None` if a byte index or table key is missing
    /// for this particular event.
    pub fn render(&self, event: &DecodedEvent, tables: &Tables) -> Option<OscMessage> {
        let addr = self.address.render(event, tables)?;
        let args = self
            .args
            .iter()
            .map(|a| a.render(event, tables))
            .collect::<Option<Vec<_>>>()?;
        Some(OscMessage { addr, args })
    }
}

fn check_field(field: Field, table: Option<&str>, class: EventClass, tables: &Tables) -> Result<(), ValidationIssue> {
    if field.class() != class {
        return Err(ValidationIssue::FieldUnavailable {
            field: format!("{:?}", field),
            class: class.name(),
        });
    }
    if let Some(table) = table {
        if !tables.contains_key(table) {
            return Err(ValidationIssue::UnknownTable(table.to_string()));
        }
        if field.kind() != FieldKind::Int {
            return Err(ValidationIssue::TableOnNonInteger(format!("{:?}", field)));
        }
    }
    Ok(())
}
