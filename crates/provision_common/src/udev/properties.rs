//! Parser for `udevadm info --query=property --export` output.
//!
//! udevadm emits one `KEY=value` pair per line, with values wrapped in
//! single quotes. Values seen in the wild are sometimes only partially
//! escaped (stray quote characters inside serial strings, for example), so
//! tokenization degrades through an ordered chain of recovery strategies
//! instead of failing the whole query on the first bad value.

use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Decoded value of a single udev property.
///
/// Serializes as `null` / string / array of strings respectively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Key present with no value after `=`.
    Absent,
    Scalar(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Properties of one device, keyed by udev property name.
/// Last occurrence wins if a key repeats in the source output.
pub type PropertyMapping = BTreeMap<String, PropertyValue>;

/// How a space-containing value is shaped for a given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    /// Re-split the first token on shell-word rules; the value is a list
    /// with embedded separators (DEVLINKS).
    SplitFirstToken,
    /// Keep only the first token as a scalar (ID_SERIAL).
    FirstToken,
    /// Keep the full token list.
    TokenList,
}

/// Keys whose space-containing values get a non-default shape. Kept as a
/// table so the policy stays auditable in one place.
const KEY_SHAPE_OVERRIDES: &[(&str, ValueShape)] = &[
    ("DEVLINKS", ValueShape::SplitFirstToken),
    ("ID_SERIAL", ValueShape::FirstToken),
];

fn shape_for_key(key: &str) -> ValueShape {
    KEY_SHAPE_OVERRIDES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, shape)| *shape)
        .unwrap_or(ValueShape::TokenList)
}

/// Strip exactly one leading and one trailing character: the single-quote
/// wrapper udevadm puts around exported values.
fn strip_wrapper(raw: &str) -> &str {
    let mut chars = raw.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

fn tokenize_raw(raw: &str) -> Option<Vec<String>> {
    shlex::split(raw)
}

/// Re-wrap the trimmed value in the single-quote wrapper and try again.
/// Fails when the trimmed value itself still contains an unbalanced quote,
/// which is exactly the case the sanitize tier exists for.
fn tokenize_requoted(raw: &str) -> Option<Vec<String>> {
    shlex::split(&format!("'{}'", strip_wrapper(raw)))
}

/// Last resort, lossy: quote characters become underscores, after which
/// tokenization cannot fail on quoting.
fn tokenize_sanitized(raw: &str) -> Option<Vec<String>> {
    shlex::split(&strip_wrapper(raw).replace(['\'', '"'], "_"))
}

/// Ordered recovery chain for tokenizing a raw property value. Each tier is
/// attempted only if the previous one failed; tier order matters.
const FALLBACK_CHAIN: &[(&str, fn(&str) -> Option<Vec<String>>)] = &[
    ("raw", tokenize_raw),
    ("requote", tokenize_requoted),
    ("sanitize", tokenize_sanitized),
];

fn tokenize_with_fallback(key: &str, raw: &str) -> Result<Vec<String>, ProvisionError> {
    for (tier, tokenize) in FALLBACK_CHAIN {
        match tokenize(raw) {
            Some(tokens) => {
                if *tier != "raw" {
                    debug!(
                        "recovered shell-escape chars via {} tier in {}={} -> {:?}",
                        tier, key, raw, tokens
                    );
                }
                return Ok(tokens);
            }
            None => {
                debug!("{} tier failed to tokenize {}={}", tier, key, raw);
            }
        }
    }
    // The sanitize tier removes every quote character, so reaching this
    // point means the fallback chain itself is broken.
    Err(ProvisionError::MalformedPropertyLine {
        line: format!("{key}={raw}"),
        reason: "all tokenization fallbacks exhausted".to_string(),
    })
}

/// Decode one `KEY=value` line of udev export output.
pub fn parse_property_line(line: &str) -> Result<(String, PropertyValue), ProvisionError> {
    let (key, raw) = line
        .split_once('=')
        .ok_or_else(|| ProvisionError::MalformedPropertyLine {
            line: line.to_string(),
            reason: "missing `=` separator".to_string(),
        })?;

    if raw.is_empty() {
        return Ok((key.to_string(), PropertyValue::Absent));
    }

    let tokens = tokenize_with_fallback(key, raw)?;
    let Some(first) = tokens.first() else {
        // Whitespace-only value tokenizes to nothing.
        return Ok((key.to_string(), PropertyValue::Absent));
    };

    // Values without spaces are scalars regardless of key; spaces mean the
    // key's shape policy decides.
    let value = if !raw.contains(' ') {
        PropertyValue::Scalar(first.clone())
    } else {
        match shape_for_key(key) {
            ValueShape::SplitFirstToken => {
                let mut items =
                    shlex::split(first).unwrap_or_else(|| vec![first.clone()]);
                items.extend(tokens.iter().skip(1).cloned());
                PropertyValue::List(items)
            }
            ValueShape::FirstToken => PropertyValue::Scalar(first.clone()),
            ValueShape::TokenList => PropertyValue::List(tokens),
        }
    };

    Ok((key.to_string(), value))
}

/// Parse the full captured text of a property query into one mapping.
///
/// Blank lines are separators and are skipped. A repeated key keeps its
/// last value. Either the whole text parses or the call fails; a partial
/// mapping is never returned.
pub fn parse_property_database(output: &str) -> Result<PropertyMapping, ProvisionError> {
    let mut mapping = PropertyMapping::new();
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        let (key, value) = parse_property_line(line)?;
        mapping.insert(key, value);
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT_OUTPUT_SDA: &str = r#"DEVLINKS='/dev/disk/by-id/wwn-0x500a0751e4d73b05 /dev/disk/by-id/ata-Crucial_CT256'
DEVNAME='/dev/sda'
DEVPATH='/devices/pci0000:00/0000:00:17.0/ata1/host0/target0:0:0/0:0:0:0/block/sda'
DEVTYPE='disk'
ID_BUS='ata'
ID_SERIAL='Crucial_CT256MX100SSD1_14250C6D6F50'
MAJOR='8'
MINOR='0'
SUBSYSTEM='block'
TAGS=':systemd:'
"#;

    #[test]
    fn scalar_without_spaces() {
        let mapping = parse_property_database("FOO=bar\n").unwrap();
        assert_eq!(mapping["FOO"], PropertyValue::Scalar("bar".to_string()));
    }

    #[test]
    fn empty_value_is_absent() {
        let mapping = parse_property_database("FOO=\n").unwrap();
        assert_eq!(mapping["FOO"], PropertyValue::Absent);
        assert_eq!(serde_json::to_string(&mapping["FOO"]).unwrap(), "null");
    }

    #[test]
    fn devlinks_becomes_list() {
        let mapping =
            parse_property_database("DEVLINKS=/dev/disk/by-id/x /dev/sda1\n").unwrap();
        assert_eq!(
            mapping["DEVLINKS"],
            PropertyValue::List(vec![
                "/dev/disk/by-id/x".to_string(),
                "/dev/sda1".to_string()
            ])
        );
    }

    #[test]
    fn quoted_devlinks_resplits_into_list() {
        let mapping = parse_property_database(
            "DEVLINKS='/dev/disk/by-id/wwn-0x5 /dev/disk/by-path/pci-0000'\n",
        )
        .unwrap();
        assert_eq!(
            mapping["DEVLINKS"],
            PropertyValue::List(vec![
                "/dev/disk/by-id/wwn-0x5".to_string(),
                "/dev/disk/by-path/pci-0000".to_string()
            ])
        );
    }

    #[test]
    fn id_serial_keeps_first_token_only() {
        let mapping = parse_property_database("ID_SERIAL=Foo Bar Drive\n").unwrap();
        assert_eq!(mapping["ID_SERIAL"], PropertyValue::Scalar("Foo".to_string()));
    }

    #[test]
    fn other_spaced_keys_keep_full_token_list() {
        let mapping = parse_property_database("ID_MODEL=Some Fine Disk\n").unwrap();
        assert_eq!(
            mapping["ID_MODEL"],
            PropertyValue::List(vec![
                "Some".to_string(),
                "Fine".to_string(),
                "Disk".to_string()
            ])
        );
    }

    #[test]
    fn unterminated_quote_recovers_via_requote_tier() {
        // One stray opening quote: the requote tier re-wraps and succeeds.
        let (key, value) = parse_property_line("ID_SERIAL_SHORT='Virtual_disk").unwrap();
        assert_eq!(key, "ID_SERIAL_SHORT");
        assert_eq!(value, PropertyValue::Scalar("Virtual_dis".to_string()));
    }

    #[test]
    fn stray_quotes_recover_via_sanitize_tier() {
        // Unbalanced quote inside the value defeats the requote tier as
        // well; the sanitize tier replaces quote characters with
        // underscores rather than failing the query.
        let (key, value) = parse_property_line("ID_SERIAL='SanDisk' Ultra'").unwrap();
        assert_eq!(key, "ID_SERIAL");
        assert_eq!(value, PropertyValue::Scalar("SanDisk_".to_string()));
    }

    #[test]
    fn line_without_separator_is_malformed() {
        let err = parse_property_line("NOSEPARATOR").unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::MalformedPropertyLine { .. }
        ));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mapping = parse_property_database("FOO=bar\n\n\nBAZ=qux\n").unwrap();
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn repeated_key_keeps_last_value() {
        let mapping = parse_property_database("FOO=first\nFOO=second\n").unwrap();
        assert_eq!(mapping["FOO"], PropertyValue::Scalar("second".to_string()));
    }

    #[test]
    fn golden_full_export_output() {
        let mapping = parse_property_database(EXPORT_OUTPUT_SDA).unwrap();
        assert_eq!(mapping["DEVNAME"], PropertyValue::Scalar("/dev/sda".to_string()));
        assert_eq!(mapping["DEVTYPE"], PropertyValue::Scalar("disk".to_string()));
        assert_eq!(
            mapping["ID_SERIAL"],
            PropertyValue::Scalar("Crucial_CT256MX100SSD1_14250C6D6F50".to_string())
        );
        assert_eq!(
            mapping["DEVLINKS"],
            PropertyValue::List(vec![
                "/dev/disk/by-id/wwn-0x500a0751e4d73b05".to_string(),
                "/dev/disk/by-id/ata-Crucial_CT256".to_string()
            ])
        );
    }

    #[test]
    fn parsing_is_idempotent() {
        let first = parse_property_database(EXPORT_OUTPUT_SDA).unwrap();
        let second = parse_property_database(EXPORT_OUTPUT_SDA).unwrap();
        assert_eq!(first, second);
    }
}
