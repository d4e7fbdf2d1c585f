//! Per-kind behavior table
//!
//! Every [`Kind`] has one [`KindOps`] row describing how to parse its
//! string form, validate a candidate against the declared value, carry the
//! declaration (bounds, allowed set) over to an accepted candidate, compare
//! for sameness and format back to a string. `Value` dispatches through this
//! table instead of matching on every variant in every method.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::types::{Bounded, MacAddr, TimeSpec, TimeVal};
use super::{Data, SetResult};

/// Discriminant of [`Data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Unknown = 0,
    Bool,
    Text,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Double,
    Enum,
    Id64,
    Mac,
    Ipv4,
    Ipv6,
    TimeVal,
    TimeSpec,
    Set,
    UnorderedSet,
    Vector,
    Struct,
    Container,
    ContainerAdd,
    ContainerRemove,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        ops(*self).name
    }

    /// Struct and Container hold children rather than data
    pub fn is_composite(&self) -> bool {
        matches!(self, Kind::Struct | Kind::Container)
    }

    /// Notification-only kinds never stored in the tree
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Kind::ContainerAdd | Kind::ContainerRemove)
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        OPS.iter().find(|row| row.name == name).map(|row| row.kind)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) type ParseFn = fn(&Data, &str) -> Result<Data, SetResult>;
pub(crate) type ValidateFn = fn(&Data, &Data) -> SetResult;
pub(crate) type AdoptFn = fn(&Data, &Data) -> Data;
pub(crate) type SameFn = fn(&Data, &Data) -> bool;
pub(crate) type FormatFn = fn(&Data, &mut fmt::Formatter<'_>) -> fmt::Result;

pub(crate) struct KindOps {
    pub kind: Kind,
    pub name: &'static str,
    /// Parse text in the context of the declared value
    pub parse: ParseFn,
    /// Check a same-kind candidate against the declared value
    pub validate: ValidateFn,
    /// Build the stored data from the declared value and an accepted candidate
    pub adopt: AdoptFn,
    pub same: SameFn,
    pub format: FormatFn,
}

pub(crate) fn ops(kind: Kind) -> &'static KindOps {
    &OPS[kind as usize]
}

macro_rules! row {
    ($kind:ident, $name:literal, $parse:expr, $validate:expr, $adopt:expr, $same:expr, $format:expr) => {
        KindOps {
            kind: Kind::$kind,
            name: $name,
            parse: $parse,
            validate: $validate,
            adopt: $adopt,
            same: $same,
            format: $format,
        }
    };
}

// NOTE: rows must stay in `Kind` discriminant order
static OPS: [KindOps; 22] = [
    row!(Unknown, "unknown", parse_unsupported, accept, take_candidate, equal, format_empty),
    row!(Bool, "bool", parse_bool, accept, take_candidate, equal, format_scalar),
    row!(Text, "text", parse_text, accept, take_candidate, equal, format_scalar),
    row!(Int32, "int32", parse_int32, validate_int32, adopt_int32, equal, format_scalar),
    row!(Uint32, "uint32", parse_uint32, validate_uint32, adopt_uint32, equal, format_scalar),
    row!(Int64, "int64", parse_int64, validate_int64, adopt_int64, equal, format_scalar),
    row!(Uint64, "uint64", parse_uint64, validate_uint64, adopt_uint64, equal, format_scalar),
    row!(Double, "double", parse_double, validate_double, adopt_double, same_double, format_scalar),
    row!(Enum, "enum", parse_enum, validate_enum, adopt_enum, equal, format_scalar),
    row!(Id64, "id64", parse_id64, accept, take_candidate, equal, format_scalar),
    row!(Mac, "mac", parse_mac, accept, take_candidate, equal, format_scalar),
    row!(Ipv4, "ipv4", parse_ipv4, accept, take_candidate, equal, format_scalar),
    row!(Ipv6, "ipv6", parse_ipv6, accept, take_candidate, equal, format_scalar),
    row!(TimeVal, "timeval", parse_timeval, validate_time, take_candidate, equal, format_scalar),
    row!(TimeSpec, "timespec", parse_timespec, validate_time, take_candidate, equal, format_scalar),
    row!(Set, "set", parse_set, accept, take_candidate, equal, format_list),
    row!(UnorderedSet, "unordered_set", parse_unordered_set, accept, take_candidate, equal, format_list),
    row!(Vector, "vector", parse_vector, accept, take_candidate, equal, format_list),
    row!(Struct, "struct", parse_unsupported, accept, take_candidate, equal, format_empty),
    row!(Container, "container", parse_unsupported, accept, take_candidate, equal, format_empty),
    row!(ContainerAdd, "container_add", parse_unsupported, accept, take_candidate, equal, format_scalar),
    row!(ContainerRemove, "container_remove", parse_unsupported, accept, take_candidate, equal, format_scalar),
];

// ===== parse =====

fn parse_unsupported(_: &Data, _: &str) -> Result<Data, SetResult> {
    Err(SetResult::InvalidType)
}

fn parse_bool(_: &Data, text: &str) -> Result<Data, SetResult> {
    match text {
        "true" => Ok(Data::Bool(true)),
        "false" => Ok(Data::Bool(false)),
        _ => Err(SetResult::InvalidType),
    }
}

fn parse_text(_: &Data, text: &str) -> Result<Data, SetResult> {
    Ok(Data::Text(text.to_string()))
}

/// Numbers must start with a digit or a sign, so that e.g. `" 5"`, `".5"`
///  and `"nan"` are rejected
fn starts_numeric(text: &str) -> bool {
    text.chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
}

fn parse_integer(text: &str) -> Result<i128, SetResult> {
    if !starts_numeric(text) {
        return Err(SetResult::InvalidType);
    }
    text.parse::<i128>().map_err(|_| SetResult::InvalidType)
}

macro_rules! bounded_integer {
    ($parse:ident, $validate:ident, $adopt:ident, $variant:ident, $ty:ty) => {
        fn $parse(declared: &Data, text: &str) -> Result<Data, SetResult> {
            let Data::$variant(bounds) = declared else {
                return Err(SetResult::InvalidType);
            };
            let wide = parse_integer(text)?;
            let value = <$ty>::try_from(wide).map_err(|_| SetResult::RangeError)?;
            Ok(Data::$variant(Bounded { value, ..*bounds }))
        }

        fn $validate(declared: &Data, candidate: &Data) -> SetResult {
            match (declared, candidate) {
                (Data::$variant(bounds), Data::$variant(c)) if bounds.contains(c.value) => {
                    SetResult::Success
                }
                (Data::$variant(_), Data::$variant(_)) => SetResult::RangeError,
                _ => SetResult::InvalidType,
            }
        }

        fn $adopt(declared: &Data, candidate: &Data) -> Data {
            match (declared, candidate) {
                (Data::$variant(bounds), Data::$variant(c)) => Data::$variant(Bounded {
                    value: c.value,
                    ..*bounds
                }),
                _ => candidate.clone(),
            }
        }
    };
}

bounded_integer!(parse_int32, validate_int32, adopt_int32, Int32, i32);
bounded_integer!(parse_uint32, validate_uint32, adopt_uint32, Uint32, u32);
bounded_integer!(parse_int64, validate_int64, adopt_int64, Int64, i64);
bounded_integer!(parse_uint64, validate_uint64, adopt_uint64, Uint64, u64);

fn parse_double(declared: &Data, text: &str) -> Result<Data, SetResult> {
    let Data::Double(bounds) = declared else {
        return Err(SetResult::InvalidType);
    };
    if !starts_numeric(text) {
        return Err(SetResult::InvalidType);
    }
    let value = text.parse::<f64>().map_err(|_| SetResult::InvalidType)?;
    if !value.is_finite() {
        return Err(SetResult::RangeError);
    }
    Ok(Data::Double(Bounded { value, ..*bounds }))
}

fn parse_enum(declared: &Data, text: &str) -> Result<Data, SetResult> {
    let Data::Enum { allowed, .. } = declared else {
        return Err(SetResult::InvalidType);
    };
    Ok(Data::Enum {
        value: text.to_string(),
        allowed: allowed.clone(),
    })
}

fn parse_id64(_: &Data, text: &str) -> Result<Data, SetResult> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| SetResult::InvalidType)?,
        None if text.starts_with(|c: char| c.is_ascii_digit()) => {
            text.parse::<u64>().map_err(|_| SetResult::InvalidType)?
        }
        None => return Err(SetResult::InvalidType),
    };
    Ok(Data::Id64(parsed))
}

fn parse_mac(_: &Data, text: &str) -> Result<Data, SetResult> {
    text.parse::<MacAddr>()
        .map(Data::Mac)
        .map_err(|_| SetResult::InvalidType)
}

fn parse_ipv4(_: &Data, text: &str) -> Result<Data, SetResult> {
    text.parse::<Ipv4Addr>()
        .map(Data::Ipv4)
        .map_err(|_| SetResult::InvalidType)
}

fn parse_ipv6(_: &Data, text: &str) -> Result<Data, SetResult> {
    text.parse::<Ipv6Addr>()
        .map(Data::Ipv6)
        .map_err(|_| SetResult::InvalidType)
}

/// `seconds:subsecond`
fn parse_seconds_pair(text: &str, limit: u32) -> Result<(i64, u32), SetResult> {
    let (secs, subsec) = text.split_once(':').ok_or(SetResult::InvalidType)?;
    if !starts_numeric(secs) || !subsec.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(SetResult::InvalidType);
    }
    let secs = secs.parse::<i64>().map_err(|_| SetResult::InvalidType)?;
    let subsec = subsec.parse::<u64>().map_err(|_| SetResult::InvalidType)?;
    if subsec >= u64::from(limit) {
        return Err(SetResult::RangeError);
    }
    Ok((secs, subsec as u32))
}

fn parse_timeval(_: &Data, text: &str) -> Result<Data, SetResult> {
    let (secs, micros) = parse_seconds_pair(text, TimeVal::SUBSEC_LIMIT)?;
    Ok(Data::TimeVal(TimeVal::new(secs, micros)))
}

fn parse_timespec(_: &Data, text: &str) -> Result<Data, SetResult> {
    let (secs, nanos) = parse_seconds_pair(text, TimeSpec::SUBSEC_LIMIT)?;
    Ok(Data::TimeSpec(TimeSpec::new(secs, nanos)))
}

/// `{a,b,c}`; whitespace around items is dropped
fn parse_list(text: &str) -> Result<Vec<String>, SetResult> {
    let inner = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or(SetResult::InvalidType)?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(inner.split(',').map(|item| item.trim().to_string()).collect())
}

fn parse_set(_: &Data, text: &str) -> Result<Data, SetResult> {
    Ok(Data::Set(parse_list(text)?.into_iter().collect::<BTreeSet<_>>()))
}

fn parse_unordered_set(_: &Data, text: &str) -> Result<Data, SetResult> {
    Ok(Data::UnorderedSet(
        parse_list(text)?.into_iter().collect::<HashSet<_>>(),
    ))
}

fn parse_vector(_: &Data, text: &str) -> Result<Data, SetResult> {
    Ok(Data::Vector(parse_list(text)?))
}

// ===== validate / adopt =====

fn accept(_: &Data, _: &Data) -> SetResult {
    SetResult::Success
}

fn take_candidate(_: &Data, candidate: &Data) -> Data {
    candidate.clone()
}

fn validate_double(declared: &Data, candidate: &Data) -> SetResult {
    match (declared, candidate) {
        (Data::Double(bounds), Data::Double(c)) if c.value.is_finite() && bounds.contains(c.value) => {
            SetResult::Success
        }
        (Data::Double(_), Data::Double(_)) => SetResult::RangeError,
        _ => SetResult::InvalidType,
    }
}

fn adopt_double(declared: &Data, candidate: &Data) -> Data {
    match (declared, candidate) {
        (Data::Double(bounds), Data::Double(c)) => Data::Double(Bounded {
            value: c.value,
            ..*bounds
        }),
        _ => candidate.clone(),
    }
}

fn validate_enum(declared: &Data, candidate: &Data) -> SetResult {
    match (declared, candidate) {
        (Data::Enum { allowed, .. }, Data::Enum { value, .. }) if allowed.contains(value) => {
            SetResult::Success
        }
        (Data::Enum { .. }, Data::Enum { .. }) => SetResult::EnumError,
        _ => SetResult::InvalidType,
    }
}

fn adopt_enum(declared: &Data, candidate: &Data) -> Data {
    match (declared, candidate) {
        (Data::Enum { allowed, .. }, Data::Enum { value, .. }) => Data::Enum {
            value: value.clone(),
            allowed: allowed.clone(),
        },
        _ => candidate.clone(),
    }
}

fn validate_time(_: &Data, candidate: &Data) -> SetResult {
    match candidate {
        Data::TimeVal(t) if t.micros >= TimeVal::SUBSEC_LIMIT => SetResult::RangeError,
        Data::TimeSpec(t) if t.nanos >= TimeSpec::SUBSEC_LIMIT => SetResult::RangeError,
        _ => SetResult::Success,
    }
}

// ===== same =====

fn equal(a: &Data, b: &Data) -> bool {
    a == b
}

/// Doubles compare bit-for-bit so NaN and -0.0 are not conflated
fn same_double(a: &Data, b: &Data) -> bool {
    match (a, b) {
        (Data::Double(x), Data::Double(y)) => {
            x.value.to_bits() == y.value.to_bits()
                && x.min.to_bits() == y.min.to_bits()
                && x.max.to_bits() == y.max.to_bits()
        }
        _ => false,
    }
}

// ===== format =====

fn format_empty(_: &Data, _: &mut fmt::Formatter<'_>) -> fmt::Result {
    Ok(())
}

fn format_scalar(data: &Data, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match data {
        Data::Bool(b) => write!(f, "{}", b),
        Data::Text(s) => f.write_str(s),
        Data::Int32(b) => write!(f, "{}", b.value),
        Data::Uint32(b) => write!(f, "{}", b.value),
        Data::Int64(b) => write!(f, "{}", b.value),
        Data::Uint64(b) => write!(f, "{}", b.value),
        Data::Double(b) => write!(f, "{}", b.value),
        Data::Enum { value, .. } => f.write_str(value),
        Data::Id64(id) => write!(f, "{:#018x}", id),
        Data::Mac(mac) => write!(f, "{}", mac),
        Data::Ipv4(addr) => write!(f, "{}", addr),
        Data::Ipv6(addr) => write!(f, "{}", addr),
        Data::TimeVal(t) => write!(f, "{}:{:06}", t.secs, t.micros),
        Data::TimeSpec(t) => write!(f, "{}:{:09}", t.secs, t.nanos),
        Data::ContainerAdd(key) | Data::ContainerRemove(key) => f.write_str(key),
        _ => Ok(()),
    }
}

fn format_list(data: &Data, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let items: Vec<&str> = match data {
        Data::Set(items) => items.iter().map(String::as_str).collect(),
        Data::UnorderedSet(items) => {
            let mut sorted: Vec<&str> = items.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            sorted
        }
        Data::Vector(items) => items.iter().map(String::as_str).collect(),
        _ => Vec::new(),
    };
    write!(f, "{{{}}}", items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_in_discriminant_order() {
        for (idx, row) in OPS.iter().enumerate() {
            assert_eq!(row.kind as usize, idx, "row {} is out of place", row.name);
        }
    }

    #[test]
    fn test_kind_names_round_trip() {
        for row in OPS.iter() {
            assert_eq!(Kind::from_name(row.name), Some(row.kind));
        }
        assert_eq!(Kind::from_name("nope"), None);
    }

    #[test]
    fn test_parse_integer_requires_leading_digit_or_sign() {
        assert_eq!(parse_integer("42"), Ok(42));
        assert_eq!(parse_integer("-42"), Ok(-42));
        assert_eq!(parse_integer("+7"), Ok(7));
        assert_eq!(parse_integer(" 7"), Err(SetResult::InvalidType));
        assert_eq!(parse_integer("0x10"), Err(SetResult::InvalidType));
        assert_eq!(parse_integer(""), Err(SetResult::InvalidType));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("{}"), Ok(vec![]));
        assert_eq!(
            parse_list("{a, b ,c}"),
            Ok(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(parse_list("a,b"), Err(SetResult::InvalidType));
    }

    #[test]
    fn test_parse_seconds_pair() {
        assert_eq!(parse_seconds_pair("12:500", 1_000_000), Ok((12, 500)));
        assert_eq!(parse_seconds_pair("-3:0", 1_000_000), Ok((-3, 0)));
        assert_eq!(
            parse_seconds_pair("1:1000000", 1_000_000),
            Err(SetResult::RangeError)
        );
        assert_eq!(parse_seconds_pair("12", 1_000_000), Err(SetResult::InvalidType));
        assert_eq!(parse_seconds_pair("a:1", 1_000_000), Err(SetResult::InvalidType));
    }
}
