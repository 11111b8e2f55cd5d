//! Template table mapping decoded MIDI events to OSC messages.
//!
//! Templates are loaded and validated once; a file that loads is guaranteed
//! to only reference fields its patterns can provide.

pub mod entry;
pub mod field;
pub mod pattern;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, info};
use rosc::OscMessage;
use serde::Deserialize;

use crate::error::{TemplateLoadError, TemplateValidationError, ValidationIssue};
use crate::midi::DecodedEvent;
use entry::{EntrySpec, TemplateEntry};
use field::{LookupTable, Tables};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableSpec {
    entries: BTreeMap<String, String>,
    default: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateFile {
    #[serde(default)]
    tables: BTreeMap<String, TableSpec>,
    templates: Vec<EntrySpec>,
}

/// Decimal or `0x` hex.
fn parse_key(key: &str) -> Option<i64> {
    let key = key.trim();
    match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => key.parse().ok(),
    }
}

fn compile_table(name: &str, spec: TableSpec) -> Result<LookupTable, TemplateValidationError> {
    let mut entries = HashMap::with_capacity(spec.entries.len());
    for (key, text) in spec.entries {
        let location = || format!("table '{}'", name);
        let Some(k) = parse_key(&key) else {
            return Err(TemplateValidationError {
                location: location(),
                issue: ValidationIssue::BadTableKey {
                    table: name.to_string(),
                    key,
                },
            });
        };
        // "1" and "0x01" land on the same key.
        if entries.insert(k, text).is_some() {
            return Err(TemplateValidationError {
                location: location(),
                issue: ValidationIssue::DuplicateTableKey {
                    table: name.to_string(),
                    key,
                },
            });
        }
    }
    Ok(LookupTable {
        entries,
        default: spec.default,
    })
}

pub struct TemplateEngine {
    entries: Vec<TemplateEntry>,
    tables: Tables,
}

impl TemplateEngine {
    pub fn from_json(source: &str) -> Result<Self, TemplateLoadError> {
        let file: TemplateFile = serde_json::from_str(source)?;

        let mut tables = Tables::new();
        for (name, spec) in file.tables {
            let table = compile_table(&name, spec)?;
            tables.insert(name, table);
        }

        let mut entries = Vec::with_capacity(file.templates.len());
        for (index, spec) in file.templates.into_iter().enumerate() {
            let location = match &spec.name {
                Some(name) => format!("template #{} '{}'", index, name),
                None => format!("template #{}", index),
            };
            let entry = TemplateEntry::compile(spec, &tables, format!("#{}", index))
                .map_err(|issue| TemplateValidationError { location, issue })?;
            entries.push(entry);
        }

        Ok(Self { entries, tables })
    }

    pub fn load(path: &Path) -> Result<Self, TemplateLoadError> {
        let source = fs::read_to_string(path).map_err(|source| TemplateLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let engine = Self::from_json(&source)?;
        info!(
            target: "template",
            "loaded {} templates and {} lookup tables from {}",
            engine.entries.len(),
            engine.tables.len(),
            path.display()
        );
        Ok(engine)
    }

    /// Every matching entry that renders, in load order.
    pub fn resolve(&self, event: &DecodedEvent) -> Vec<OscMessage> {
        let mut out = Vec::new();
        for entry in self.entries.iter().filter(|e| e.matches(event)) {
            match entry.render(event, &self.tables) {
                Some(msg) => out.push(msg),
                None => debug!(target: "template", "template {} matched but has no value for {:?}", entry.name(), event),
            }
        }
        if out.is_empty() {
            debug!(target: "template", "no output for {} event", event.class_name());
        }
        out
    }

    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{ParamSource, ParameterChange, SysExCommand};
    use rosc::OscType;

    const TWO_ON_ONE: &str = r#"{
        "templates": [
            { "name": "fader", "match": { "class": "parameter_change", "parameter_lsb": 23 },
              "address": "/ch/{parameter_msb}/fader", "args": [ { "type": "int", "field": "value" } ] },
            { "name": "anything", "match": { "class": "parameter_change" },
              "address": "/raw", "args": [ { "type": "int", "field": "parameter" } ] },
            { "name": "sysex only", "match": { "class": "sysex" }, "address": "/sysex" }
        ]
    }"#;

    fn fader(msb: u16, value: u16) -> DecodedEvent {
        DecodedEvent::ParameterChange(ParameterChange {
            channel: 0,
            parameter: msb << 7 | 23,
            value,
            source: ParamSource::Nrpn,
        })
    }

    #[test]
    fn test_every_match_in_load_order() {
        let engine = TemplateEngine::from_json(TWO_ON_ONE).unwrap();
        assert_eq!(engine.len(), 3);
        let out = engine.resolve(&fader(4, 1000));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].addr, "/ch/4/fader");
        assert_eq!(out[0].args, vec![OscType::Int(1000)]);
        assert_eq!(out[1].addr, "/raw");
        assert_eq!(out[1].args, vec![OscType::Int(4 << 7 | 23)]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let engine = TemplateEngine::from_json(TWO_ON_ONE).unwrap();
        let other = DecodedEvent::Other(crate::midi::OtherMessage { status: 0xFA, data: vec![] });
        assert!(engine.resolve(&other).is_empty());
    }

    #[test]
    fn test_table_default_and_miss() {
        let engine = TemplateEngine::from_json(
            r#"{
                "tables": {
                    "mmc": { "entries": { "0x01": "stop", "2": "play" }, "default": "unknown" },
                    "strict": { "entries": { "1": "one" } }
                },
                "templates": [
                    { "match": { "class": "sysex" }, "address": "/mmc/{body[0]|mmc}" },
                    { "match": { "class": "sysex" }, "address": "/strict/{body[0]|strict}" }
                ]
            }"#,
        )
        .unwrap();
        let cmd = |b: u8| {
            DecodedEvent::SysEx(SysExCommand {
                manufacturer: vec![0x7F],
                device: vec![0x7F],
                body: vec![b],
            })
        };

        let out = engine.resolve(&cmd(2));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].addr, "/mmc/play");

        let out = engine.resolve(&cmd(1));
        assert_eq!(out.iter().map(|m| m.addr.as_str()).collect::<Vec<_>>(), vec!["/mmc/stop", "/strict/one"]);

        let out = engine.resolve(&cmd(0x44));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].addr, "/mmc/unknown");
    }

    #[test]
    fn test_body_index_past_end_skips_entry() {
        let engine = TemplateEngine::from_json(
            r#"{ "templates": [ { "match": { "class": "sysex" }, "address": "/b", "args": [ { "type": "int", "field": "body[3]" } ] } ] }"#,
        )
        .unwrap();
        let short = DecodedEvent::SysEx(SysExCommand {
            manufacturer: vec![0, 0, 0x1A],
            device: vec![0x50, 0x11, 1, 0],
            body: vec![0x00, 0x11],
        });
        assert!(engine.resolve(&short).is_empty());
    }

    #[test]
    fn test_validation_error_names_the_entry() {
        let err = TemplateEngine::from_json(
            r#"{ "templates": [
                { "match": { "class": "other" }, "address": "/ok" },
                { "name": "broken", "match": { "class": "other" }, "address": "/x/{value}" }
            ] }"#,
        )
        .err()
        .unwrap();
        match err {
            TemplateLoadError::Validation(e) => {
                assert_eq!(e.location, "template #1 'broken'");
                assert!(matches!(e.issue, ValidationIssue::FieldUnavailable { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_bad_table_key() {
        let err = TemplateEngine::from_json(
            r#"{ "tables": { "t": { "entries": { "one": "1" } } }, "templates": [] }"#,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            TemplateLoadError::Validation(TemplateValidationError {
                issue: ValidationIssue::BadTableKey { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_table_key() {
        let err = TemplateEngine::from_json(
            r#"{ "tables": { "t": { "entries": { "0x01": "a", "1": "b" } } }, "templates": [] }"#,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            TemplateLoadError::Validation(TemplateValidationError {
                issue: ValidationIssue::DuplicateTableKey { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_misspelled_match_key_is_a_parse_error() {
        let err = TemplateEngine::from_json(
            r#"{ "templates": [ { "match": { "class": "parameter_change", "paramter_lsb": 23 }, "address": "/fader" } ] }"#,
        )
        .err()
        .unwrap();
        assert!(matches!(err, TemplateLoadError::Parse(_)));
    }

    #[test]
    fn test_unknown_match_class_is_a_parse_error() {
        let err = TemplateEngine::from_json(r#"{ "templates": [ { "match": { "class": "note" }, "address": "/n" } ] }"#)
            .err()
            .unwrap();
        assert!(matches!(err, TemplateLoadError::Parse(_)));
    }

    #[test]
    fn test_shipped_templates_validate() {
        let engine = TemplateEngine::from_json(include_str!("../../config/templates.json")).unwrap();
        assert!(!engine.is_empty());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("0x1A"), Some(26));
        assert_eq!(parse_key(" 12 "), Some(12));
        assert_eq!(parse_key("x"), None);
    }
}
