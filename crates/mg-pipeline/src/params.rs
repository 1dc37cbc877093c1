//! Parameter-segment parsing shared by every action's `validate`.
//!
//! A segment containing `_` is a keyed parameter split at the first `_`
//! (`w_100`, `image_aGVsbG8_`); anything else is a bare value (`90`,
//! `webp`). Every error names the action and the offending key.

use std::ops::RangeInclusive;
use std::str::FromStr;

use mg_core::{Error, Result};

// ---------------------------------------------------------------------------
// Gravity
// ---------------------------------------------------------------------------

/// Anchor position of a box inside an outer area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    North,
    South,
    East,
    West,
    Center,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Start,
    Middle,
    End,
}

impl Gravity {
    /// Parse a gravity name or one of the `nw`/`ne`/`sw`/`se` aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "north" => Some(Self::North),
            "south" => Some(Self::South),
            "east" => Some(Self::East),
            "west" => Some(Self::West),
            "center" => Some(Self::Center),
            "northeast" | "ne" => Some(Self::NorthEast),
            "northwest" | "nw" => Some(Self::NorthWest),
            "southeast" | "se" => Some(Self::SouthEast),
            "southwest" | "sw" => Some(Self::SouthWest),
            _ => None,
        }
    }

    fn anchors(self) -> (Anchor, Anchor) {
        use Anchor::*;
        match self {
            Self::North => (Middle, Start),
            Self::South => (Middle, End),
            Self::East => (End, Middle),
            Self::West => (Start, Middle),
            Self::Center => (Middle, Middle),
            Self::NorthEast => (End, Start),
            Self::NorthWest => (Start, Start),
            Self::SouthEast => (End, End),
            Self::SouthWest => (Start, End),
        }
    }

    /// Top-left corner of an `inner` box anchored inside `outer`.
    ///
    /// Offsets push the box away from the edge it is anchored to and are
    /// ignored on a centered axis. The result may be negative or past the
    /// far edge when `inner` is larger than `outer`.
    pub fn place(self, outer: (u32, u32), inner: (u32, u32), offset: (u32, u32)) -> (i64, i64) {
        let (h, v) = self.anchors();
        (
            place_axis(h, outer.0, inner.0, offset.0),
            place_axis(v, outer.1, inner.1, offset.1),
        )
    }
}

fn place_axis(anchor: Anchor, outer: u32, inner: u32, offset: u32) -> i64 {
    let (outer, inner, offset) = (i64::from(outer), i64::from(inner), i64::from(offset));
    match anchor {
        Anchor::Start => offset,
        Anchor::Middle => (outer - inner) / 2,
        Anchor::End => outer - inner - offset,
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Parameter segments of one token, checked against an allow-list.
#[derive(Debug)]
pub struct Params<'a> {
    action: &'static str,
    keyed: Vec<(&'a str, &'a str)>,
    bare: Vec<&'a str>,
}

impl<'a> Params<'a> {
    /// Split `raw` into keyed and bare segments.
    ///
    /// Fails on a key outside `allowed`, a key without a value, or a
    /// repeated key.
    pub fn parse(action: &'static str, raw: &'a [String], allowed: &[&str]) -> Result<Self> {
        let mut keyed: Vec<(&str, &str)> = Vec::new();
        let mut bare = Vec::new();

        for segment in raw {
            let Some((key, value)) = segment.split_once('_') else {
                bare.push(segment.as_str());
                continue;
            };
            if !allowed.contains(&key) {
                return Err(Error::invalid(format!("{action}: unknown parameter {key:?}")));
            }
            if value.is_empty() {
                return Err(Error::invalid(format!("{action}: missing value for {key}")));
            }
            if keyed.iter().any(|(k, _)| *k == key) {
                return Err(Error::invalid(format!("{action}: duplicate parameter {key}")));
            }
            keyed.push((key, value));
        }

        Ok(Self {
            action,
            keyed,
            bare,
        })
    }

    /// Raw value of a keyed parameter.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.keyed.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Whether any keyed parameter was supplied.
    pub fn has_keyed(&self) -> bool {
        !self.keyed.is_empty()
    }

    /// Reject bare values for actions that only take keyed parameters.
    pub fn no_bare(&self) -> Result<()> {
        match self.bare.first() {
            Some(v) => Err(Error::invalid(format!(
                "{}: unexpected value {v:?}",
                self.action
            ))),
            None => Ok(()),
        }
    }

    /// The single bare value of actions like `rotate,90`.
    pub fn single_bare(&self) -> Result<&'a str> {
        if self.has_keyed() {
            return Err(Error::invalid(format!(
                "{}: takes a single value, not keyed parameters",
                self.action
            )));
        }
        match self.bare.as_slice() {
            [v] => Ok(v),
            other => Err(Error::invalid(format!(
                "{}: expects exactly one value, got {}",
                self.action,
                other.len()
            ))),
        }
    }

    /// A keyed integer checked against an inclusive range.
    pub fn int(&self, key: &str, range: RangeInclusive<i64>) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| parse_in_range(self.action, key, v, &range))
            .transpose()
    }

    /// Like [`int`](Self::int) for ranges that fit in `u32`.
    pub fn uint(&self, key: &str, range: RangeInclusive<u32>) -> Result<Option<u32>> {
        let wide = i64::from(*range.start())..=i64::from(*range.end());
        Ok(self.int(key, wide)?.map(|v| v as u32))
    }

    /// A keyed value from a closed set.
    pub fn choice(&self, key: &str, options: &[&'static str]) -> Result<Option<&'static str>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        options
            .iter()
            .find(|o| **o == value)
            .copied()
            .map(Some)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "{}: {key} must be one of {}, got {value:?}",
                    self.action,
                    options.join("|")
                ))
            })
    }

    /// A keyed `0`/`1` switch.
    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.int(key, 0..=1)?.map(|v| v == 1))
    }

    /// A keyed gravity.
    pub fn gravity(&self, key: &str) -> Result<Option<Gravity>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        Gravity::parse(value).map(Some).ok_or_else(|| {
            Error::invalid(format!("{}: {key} is not a gravity: {value:?}", self.action))
        })
    }
}

/// Parse `value` as an integer inside `range`, naming `key` on failure.
pub fn parse_in_range<T>(action: &str, key: &str, value: &str, range: &RangeInclusive<T>) -> Result<T>
where
    T: FromStr + PartialOrd + std::fmt::Display,
{
    let n: T = value
        .parse()
        .map_err(|_| Error::invalid(format!("{action}: {key} is not a number: {value:?}")))?;
    if !range.contains(&n) {
        return Err(Error::invalid(format!(
            "{action}: {key} must be between {} and {}, got {n}",
            range.start(),
            range.end()
        )));
    }
    Ok(n)
}
