//! The fixed set of per-interface pf statistics fields.
//!
//! `pfctl -vvsInterface` reports one line per combination of direction,
//! address family and action, keyed like `In4/Pass` or `Out6/Block`.

use std::fmt;
use std::str::FromStr;

/// Traffic direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// Inbound traffic.
    In,
    /// Outbound traffic.
    Out,
}

/// Address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    /// IPv4.
    Ipv4,
    /// IPv6.
    Ipv6,
}

/// Action taken by pf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Traffic passed.
    Pass,
    /// Traffic blocked.
    Block,
}

impl Direction {
    /// Label value (`In` / `Out`).
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "In",
            Direction::Out => "Out",
        }
    }
}

impl AddressFamily {
    /// Label value (`IPv4` / `IPv6`).
    pub fn as_str(self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "IPv4",
            AddressFamily::Ipv6 => "IPv6",
        }
    }

    fn digit(self) -> char {
        match self {
            AddressFamily::Ipv4 => '4',
            AddressFamily::Ipv6 => '6',
        }
    }
}

impl Action {
    /// Label value (`Pass` / `Block`).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Pass => "Pass",
            Action::Block => "Block",
        }
    }
}

/// One of the eight (direction, address family, action) combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatField {
    /// Traffic direction.
    pub direction: Direction,
    /// Address family.
    pub family: AddressFamily,
    /// Action taken.
    pub action: Action,
}

impl StatField {
    /// All eight fields, in a stable order.
    pub const ALL: [StatField; 8] = {
        use {Action::*, AddressFamily::*, Direction::*};
        [
            StatField::new(In, Ipv4, Pass),
            StatField::new(In, Ipv4, Block),
            StatField::new(In, Ipv6, Pass),
            StatField::new(In, Ipv6, Block),
            StatField::new(Out, Ipv4, Pass),
            StatField::new(Out, Ipv4, Block),
            StatField::new(Out, Ipv6, Pass),
            StatField::new(Out, Ipv6, Block),
        ]
    };

    /// Creates a field from its parts.
    pub const fn new(direction: Direction, family: AddressFamily, action: Action) -> Self {
        Self {
            direction,
            family,
            action,
        }
    }

    /// Key as printed by pfctl, e.g. `In4/Pass`.
    pub fn key(&self) -> String {
        format!(
            "{}{}/{}",
            self.direction.as_str(),
            self.family.digit(),
            self.action.as_str()
        )
    }

    /// Constant labels identifying this field in exported metrics.
    pub fn const_labels(&self) -> [(&'static str, &'static str); 3] {
        [
            ("dir", self.direction.as_str()),
            ("af", self.family.as_str()),
            ("action", self.action.as_str()),
        ]
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Error for keys outside the fixed field set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pf stats field {0:?}")]
pub struct UnknownField(pub String);

impl FromStr for StatField {
    type Err = UnknownField;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (head, action) = key
            .split_once('/')
            .ok_or_else(|| UnknownField(key.to_string()))?;

        let (direction, family) = match head {
            "In4" => (Direction::In, AddressFamily::Ipv4),
            "In6" => (Direction::In, AddressFamily::Ipv6),
            "Out4" => (Direction::Out, AddressFamily::Ipv4),
            "Out6" => (Direction::Out, AddressFamily::Ipv6),
            _ => return Err(UnknownField(key.to_string())),
        };
        let action = match action {
            "Pass" => Action::Pass,
            "Block" => Action::Block,
            _ => return Err(UnknownField(key.to_string())),
        };

        Ok(StatField::new(direction, family, action))
    }
}
