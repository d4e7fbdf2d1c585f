use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::{Access, Kind, MacAddr, Origin, SetResult, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("kind {0} cannot be declared")]
    Undeclarable(Kind),
    #[error("invalid {which} bound for {kind}: {text}")]
    Bound {
        kind: Kind,
        which: &'static str,
        text: String,
    },
    #[error("enum declared without allowed values")]
    EmptyEnum,
    #[error("declaration rejected: {0:?}")]
    Rejected(SetResult),
    #[error("default {text:?} rejected for {kind}: {result:?}")]
    Default {
        kind: Kind,
        text: String,
        result: SetResult,
    },
}

/// Textual description of a value, as found in schema and config files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declaration<'a> {
    pub default: Option<&'a str>,
    pub min: Option<&'a str>,
    pub max: Option<&'a str>,
    pub allowed: &'a [String],
    pub access: Access,
}

fn bound<T: FromStr>(kind: Kind, which: &'static str, text: Option<&str>, fallback: T) -> Result<T, ValueError> {
    match text {
        None => Ok(fallback),
        Some(text) => text.trim().parse().map_err(|_| ValueError::Bound {
            kind,
            which,
            text: text.to_string(),
        }),
    }
}

/// Zero if the interval holds it, else the lower bound
fn start<T: PartialOrd + Copy + Default>(min: T, max: T) -> T {
    let zero = T::default();
    if zero >= min && zero <= max {
        zero
    } else {
        min
    }
}

macro_rules! interval {
    ($ctor:ident, $ty:ty, $kind:expr, $decl:expr) => {{
        let min = bound::<$ty>($kind, "min", $decl.min, <$ty>::MIN)?;
        let max = bound::<$ty>($kind, "max", $decl.max, <$ty>::MAX)?;
        Value::$ctor(start(min, max), min, max)
    }};
}

impl Value {
    /// Build a declared value of `kind` from its textual description
    ///
    /// Bounds default to the full range of the kind and the initial value to
    ///  zero (or the lower bound), the empty string or the first allowed
    ///  enumerator. The default text, if any, is written through
    ///  [`Value::set_str`] before the access mode is applied.
    pub fn declare(kind: Kind, decl: &Declaration<'_>) -> Result<Value, ValueError> {
        let mut value = match kind {
            Kind::Unknown => Value::unknown(),
            Kind::Bool => Value::boolean(false),
            Kind::Text => Value::text(""),
            Kind::Int32 => interval!(int32, i32, kind, decl),
            Kind::Uint32 => interval!(uint32, u32, kind, decl),
            Kind::Int64 => interval!(int64, i64, kind, decl),
            Kind::Uint64 => interval!(uint64, u64, kind, decl),
            Kind::Double => {
                let min = bound::<f64>(kind, "min", decl.min, f64::MIN)?;
                let max = bound::<f64>(kind, "max", decl.max, f64::MAX)?;
                Value::double(start(min, max), min, max)
            }
            Kind::Enum => {
                let first = decl.allowed.first().ok_or(ValueError::EmptyEnum)?;
                Value::enumeration(first.clone(), decl.allowed.iter().cloned())
            }
            Kind::Id64 => Value::id64(0),
            Kind::Mac => Value::mac(MacAddr([0; 6])),
            Kind::Ipv4 => Value::ipv4(Ipv4Addr::UNSPECIFIED),
            Kind::Ipv6 => Value::ipv6(Ipv6Addr::UNSPECIFIED),
            Kind::TimeVal => Value::timeval(0, 0),
            Kind::TimeSpec => Value::timespec(0, 0),
            Kind::Set => Value::ordered_set(Vec::<String>::new()),
            Kind::UnorderedSet => Value::unordered_set(Vec::<String>::new()),
            Kind::Vector => Value::vector(Vec::<String>::new()),
            Kind::Struct => Value::structure(),
            Kind::Container => Value::container(),
            Kind::ContainerAdd | Kind::ContainerRemove => {
                return Err(ValueError::Undeclarable(kind))
            }
        };

        let verdict = value.validate();
        if verdict != SetResult::Success {
            return Err(ValueError::Rejected(verdict));
        }
        if let Some(text) = decl.default {
            let result = value.set_str(text, Origin::Remote);
            if !result.is_ok() {
                return Err(ValueError::Default {
                    kind,
                    text: text.to_string(),
                    result,
                });
            }
        }
        Ok(value.with_access(decl.access))
    }
}
