use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A numeric value with its declared inclusive interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounded<T> {
    pub value: T,
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounded<T> {
    pub fn new(value: T, min: T, max: T) -> Self {
        Self { value, min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// 48-bit hardware address, e.g. `02:00:5e:10:00:01`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hardware address: {0}")]
pub struct MacAddrParseError(pub String);

impl MacAddr {
    pub fn as_u64(&self) -> u64 {
        self.0
            .iter()
            .fold(0u64, |acc, octet| (acc << 8) | u64::from(*octet))
    }
}

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| MacAddrParseError(s.to_string()))?;
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacAddrParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacAddrParseError(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Seconds plus microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeVal {
    pub secs: i64,
    pub micros: u32,
}

impl TimeVal {
    pub const SUBSEC_LIMIT: u32 = 1_000_000;

    pub fn new(secs: i64, micros: u32) -> Self {
        Self { secs, micros }
    }
}

/// Seconds plus nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSpec {
    pub secs: i64,
    pub nanos: u32,
}

impl TimeSpec {
    pub const SUBSEC_LIMIT: u32 = 1_000_000_000;

    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }
}
