//! Attribute codec for the device line protocol
//!
//! Wire format: plaintext ASCII, one line per command, each `name:value`
//! token followed by `,`, the line terminated by `\n`. No escaping, no
//! length prefix, no response.

use std::fmt;

use bytes::Bytes;
use errors::{IrconError, Result};
use serde::{Deserialize, Serialize};

use crate::schema::{Row, TableSchema, Value};

/// Placeholder for an attribute never set, or just reset
pub const UNKNOWN: &str = "-";

/// Literal command sent on delete, independent of the cache contents
pub const RESET_COMMAND: &str = "mode:-,\n";

/// Attributes the device understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Mode,
    Temperature,
    Power,
    Angle,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Mode,
        Attribute::Temperature,
        Attribute::Power,
        Attribute::Angle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::Temperature => "temperature",
            Self::Power => "power",
            Self::Angle => "angle",
        }
    }

    /// Match a column name against the recognized set (exact, case-sensitive)
    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.as_str() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known value of every recognized attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCache {
    values: [String; 4],
}

impl Default for AttributeCache {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|_| UNKNOWN.to_string()),
        }
    }
}

impl AttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attr: Attribute) -> &str {
        &self.values[attr.index()]
    }

    /// Store `value` unless it is empty; empty writes keep the previous value
    pub fn set(&mut self, attr: Attribute, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        let slot = &mut self.values[attr.index()];
        slot.clear();
        slot.push_str(value);
        true
    }

    /// Put every attribute back to [`UNKNOWN`]
    pub fn reset(&mut self) {
        for slot in &mut self.values {
            slot.clear();
            slot.push_str(UNKNOWN);
        }
    }

    pub fn is_unknown(&self, attr: Attribute) -> bool {
        self.get(attr) == UNKNOWN
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &str)> {
        Attribute::ALL.into_iter().map(|attr| (attr, self.get(attr)))
    }
}

/// Stateless translation between rows, the cache and wire tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeCodec;

impl AttributeCodec {
    /// Encode one column.
    ///
    /// Recognized columns update the cache when `value` is non-empty and
    /// always produce `"<attribute>:<cached value>"`. Unrecognized columns
    /// produce nothing.
    pub fn encode(column: &str, value: &str, cache: &mut AttributeCache) -> Option<String> {
        let attr = Attribute::from_column(column)?;
        cache.set(attr, value);
        Some(format!("{}:{}", attr, cache.get(attr)))
    }

    /// Cached value for a column; unrecognized columns read as [`UNKNOWN`]
    pub fn decode<'a>(cache: &'a AttributeCache, column: &str) -> &'a str {
        match Attribute::from_column(column) {
            Some(attr) => cache.get(attr),
            None => UNKNOWN,
        }
    }

    /// Reject values that would break line framing.
    ///
    /// Runs over the whole row before any cache mutation so a rejected row
    /// leaves the cache untouched.
    pub fn validate_row(schema: &TableSchema, row: &Row) -> Result<()> {
        for (idx, column) in schema.columns.iter().enumerate() {
            if Attribute::from_column(&column.name).is_none() {
                continue;
            }
            let text = row.get(idx).as_wire_text();
            if let Some(bad) = text.chars().find(|c| matches!(c, ',' | '\n' | '\r')) {
                return Err(IrconError::invalid_value(
                    &column.name,
                    format!("contains {:?}, which the line protocol cannot carry", bad),
                ));
            }
        }
        Ok(())
    }

    /// Encode a full row in schema order into one wire line
    pub fn encode_row(schema: &TableSchema, row: &Row, cache: &mut AttributeCache) -> Bytes {
        let mut line = String::new();
        for (idx, column) in schema.columns.iter().enumerate() {
            let value = row.get(idx).as_wire_text();
            if let Some(token) = Self::encode(&column.name, &value, cache) {
                line.push_str(&token);
                line.push(',');
            }
        }
        line.push('\n');
        Bytes::from(line)
    }

    /// Project the cache onto the schema as one row.
    ///
    /// Text columns carry the cached text, UNKNOWN included. Integer and
    /// Float columns hold the parsed value, and read as `Null` when the text
    /// is UNKNOWN or otherwise not a number; an unknown attribute never
    /// shows up as a made-up `0`.
    pub fn decode_row(schema: &TableSchema, cache: &AttributeCache) -> Row {
        schema
            .columns
            .iter()
            .map(|column| Value::from_cached(Self::decode(cache, &column.name), column.column_type))
            .collect()
    }

    /// Split a received line into `(name, value)` pairs.
    ///
    /// Tokens without a `:` are skipped; the value is everything after the
    /// first `:`.
    pub fn parse_line(line: &str) -> Vec<(&str, &str)> {
        line.trim_end_matches(['\n', '\r'])
            .split(',')
            .filter_map(|token| token.split_once(':'))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType};

    fn schema(columns: &[&str]) -> TableSchema {
        TableSchema::new(
            "127.0.0.1:9999",
            columns.iter().map(|c| ColumnDef::text(*c)).collect(),
        )
    }

    #[test]
    fn test_cache_starts_unknown() {
        let cache = AttributeCache::new();
        for (_, value) in cache.iter() {
            assert_eq!(value, UNKNOWN);
        }
    }

    #[test]
    fn test_empty_value_keeps_cached() {
        let mut cache = AttributeCache::new();
        assert_eq!(
            AttributeCodec::encode("mode", "on", &mut cache).as_deref(),
            Some("mode:on")
        );
        assert_eq!(
            AttributeCodec::encode("mode", "", &mut cache).as_deref(),
            Some("mode:on")
        );
        assert_eq!(cache.get(Attribute::Mode), "on");
    }

    #[test]
    fn test_unrecognized_column_is_invisible() {
        let mut cache = AttributeCache::new();
        assert_eq!(AttributeCodec::encode("fan", "high", &mut cache), None);
        assert_eq!(AttributeCodec::encode("Mode", "on", &mut cache), None);
        assert_eq!(AttributeCodec::decode(&cache, "fan"), UNKNOWN);
        assert_eq!(cache, AttributeCache::new());
    }

    #[test]
    fn test_encode_row_line_format() {
        let schema = schema(&["mode", "power"]);
        let mut cache = AttributeCache::new();
        let row = Row::new(vec![Value::from("on"), Value::from("")]);

        let line = AttributeCodec::encode_row(&schema, &row, &mut cache);
        assert_eq!(&line[..], b"mode:on,power:-,\n");
        assert_eq!(cache.get(Attribute::Mode), "on");
        assert!(cache.is_unknown(Attribute::Power));
    }

    #[test]
    fn test_encode_row_skips_unrecognized_without_delimiter() {
        let schema = schema(&["id", "temperature", "note", "angle"]);
        let mut cache = AttributeCache::new();
        let row = Row::new(vec![
            Value::Integer(1),
            Value::Integer(24),
            Value::from("ignored"),
            Value::Null,
        ]);

        let line = AttributeCodec::encode_row(&schema, &row, &mut cache);
        assert_eq!(&line[..], b"temperature:24,angle:-,\n");
    }

    #[test]
    fn test_encode_row_without_recognized_columns() {
        let schema = schema(&["id"]);
        let mut cache = AttributeCache::new();
        let line = AttributeCodec::encode_row(&schema, &Row::new(vec![Value::Integer(1)]), &mut cache);
        assert_eq!(&line[..], b"\n");
    }

    #[test]
    fn test_validate_row_rejects_framing_characters() {
        let schema = schema(&["mode", "note"]);
        let bad = Row::new(vec![Value::from("on,off"), Value::Null]);
        assert!(matches!(
            AttributeCodec::validate_row(&schema, &bad),
            Err(IrconError::InvalidValue { .. })
        ));

        // Unrecognized columns never reach the wire, so anything goes there
        let ok = Row::new(vec![Value::from("on"), Value::from("a\nb")]);
        assert!(AttributeCodec::validate_row(&schema, &ok).is_ok());
    }

    #[test]
    fn test_decode_row_uses_column_types() {
        let schema = TableSchema::new(
            "dev",
            vec![
                ColumnDef::text("mode"),
                ColumnDef::new("temperature", ColumnType::Integer),
                ColumnDef::new("angle", ColumnType::Float),
                ColumnDef::text("label"),
            ],
        );
        let mut cache = AttributeCache::new();
        cache.set(Attribute::Mode, "cool");
        cache.set(Attribute::Temperature, "24");

        let row = AttributeCodec::decode_row(&schema, &cache);
        assert_eq!(
            row.values,
            vec![
                Value::from("cool"),
                Value::Integer(24),
                Value::Null,
                Value::from(UNKNOWN),
            ]
        );
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            AttributeCodec::parse_line("mode:on,power:-,\n"),
            vec![("mode", "on"), ("power", "-")]
        );
        assert_eq!(AttributeCodec::parse_line("\n"), Vec::<(&str, &str)>::new());
        assert_eq!(
            AttributeCodec::parse_line("mode:a:b,junk,"),
            vec![("mode", "a:b")]
        );
    }
}
