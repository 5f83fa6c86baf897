use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// The byte every transformer must eliminate when nothing else is configured.
pub const NULL_BYTE: u8 = 0x00;

/// An immutable set of byte values that processed output must not contain.
///
/// Membership is a 256-entry lookup table, so every member is a valid byte by
/// construction. The set is never empty: parsing falls back to `{0x00}`.
#[derive(Clone, PartialEq, Eq)]
pub struct BadCharSet {
    members: [bool; 256],
}

/// A token from a bad-character list that was dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectedToken {
    /// The token was not a hexadecimal number.
    InvalidHex(String),
    /// The token parsed, but the value does not fit in a byte.
    OutOfRange(String),
}

impl fmt::Display for RejectedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectedToken::InvalidHex(token) => write!(f, "Invalid hex value: {token}"),
            RejectedToken::OutOfRange(token) => {
                write!(f, "Byte value out of range (0-255): {token}")
            }
        }
    }
}

impl BadCharSet {
    /// Builds a set from explicit byte values. An empty slice yields the default set.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::default();
        }
        let mut members = [false; 256];
        for &b in bytes {
            members[b as usize] = true;
        }
        Self { members }
    }

    /// Parses a comma-separated hex list such as `"00,0a,0d"`.
    ///
    /// Invalid or out-of-range tokens are dropped and logged as warnings. If
    /// nothing valid remains, the default `{0x00}` set is returned.
    pub fn parse(list: &str) -> Self {
        let (set, rejected) = Self::parse_reporting(list);
        for token in &rejected {
            warn!("{token}");
        }
        set
    }

    /// Same as [`BadCharSet::parse`] but hands the rejected tokens back to the caller.
    pub fn parse_reporting(list: &str) -> (Self, Vec<RejectedToken>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            match u32::from_str_radix(digits, 16) {
                Ok(value) => match u8::try_from(value) {
                    Ok(byte) => accepted.push(byte),
                    Err(_) => rejected.push(RejectedToken::OutOfRange(token.to_string())),
                },
                Err(_) => rejected.push(RejectedToken::InvalidHex(token.to_string())),
            }
        }

        (Self::from_bytes(&accepted), rejected)
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.members[byte as usize]
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |&b| self.contains(b))
    }

    pub fn len(&self) -> usize {
        self.members.iter().filter(|&&m| m).count()
    }

    /// Never true for a set built by this module.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BadCharSet {
    fn default() -> Self {
        let mut members = [false; 256];
        members[NULL_BYTE as usize] = true;
        Self { members }
    }
}

impl FromStr for BadCharSet {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Renders as `0x00,0x0a`.
impl fmt::Display for BadCharSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.iter().map(|b| format!("0x{b:02x}")).collect();
        f.write_str(&rendered.join(","))
    }
}

impl fmt::Debug for BadCharSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BadCharSet({self})")
    }
}
