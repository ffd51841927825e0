//! Station info specifications.
//!
//! An info spec lists station attributes whose values are attached to every finished
//! episode. It is written in a literal list-of-pairs form:
//!
//! ```text
//! [('A1', 'waiting_time'), ("Source", "n_parts")]
//! ```
//!
//! Either quote style is accepted, a trailing comma is allowed and `[]` is the empty spec.

use std::{fmt, iter::Peekable, str::CharIndices, str::FromStr};

use serde::Serialize;

/// Attribute of a station that can be reported through an [`InfoSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StationAttribute {
    /// Ticks the most recent part waited before the station started it.
    WaitingTime,
    /// Workers currently assigned to the station.
    NWorkers,
    /// Fraction of elapsed ticks the station spent working.
    Utilization,
    /// Fill level of the station's input buffer in `[0, 1]`.
    BufferFill,
    /// Parts completed (or emitted, for a source).
    NParts,
    /// Parts scrapped at the station.
    NScrap,
    /// Current nominal processing time in ticks.
    ProcessingTime,
}

impl StationAttribute {
    pub const ALL: [Self; 7] = [
        Self::WaitingTime,
        Self::NWorkers,
        Self::Utilization,
        Self::BufferFill,
        Self::NParts,
        Self::NScrap,
        Self::ProcessingTime,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WaitingTime => "waiting_time",
            Self::NWorkers => "n_workers",
            Self::Utilization => "utilization",
            Self::BufferFill => "buffer_fill",
            Self::NParts => "n_parts",
            Self::NScrap => "n_scrap",
            Self::ProcessingTime => "processing_time",
        }
    }
}

impl fmt::Display for StationAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StationAttribute {
    type Err = InfoSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.name() == s)
            .ok_or_else(|| InfoSpecError::UnknownAttribute { name: s.to_owned() })
    }
}

/// One `(station, attribute)` entry of an [`InfoSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationInfo {
    pub station: String,
    pub attribute: StationAttribute,
}

/// Value of one [`StationInfo`] entry, read at the end of an episode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationInfoValue {
    pub station: String,
    pub attribute: StationAttribute,
    pub value: f64,
}

/// Ordered list of station attributes to report.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InfoSpec(Vec<StationInfo>);

impl InfoSpec {
    #[must_use]
    pub fn new(entries: Vec<StationInfo>) -> Self {
        Self(entries)
    }

    #[must_use]
    pub fn entries(&self) -> &[StationInfo] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for InfoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "('{}', '{}')", entry.station, entry.attribute)?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum InfoSpecError {
    #[display("info spec ended unexpectedly, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[display("unexpected `{found}` at offset {offset} in info spec, expected {expected}")]
    Unexpected {
        offset: usize,
        found: char,
        expected: &'static str,
    },
    #[display("unknown station attribute `{name}`")]
    UnknownAttribute { name: String },
}

impl FromStr for InfoSpec {
    type Err = InfoSpecError;

    /// Parses the literal list-of-pairs form.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineflow_line::{InfoSpec, StationAttribute};
    ///
    /// let spec: InfoSpec = "[('A1', 'waiting_time')]".parse().unwrap();
    /// assert_eq!(spec.entries()[0].station, "A1");
    /// assert_eq!(spec.entries()[0].attribute, StationAttribute::WaitingTime);
    ///
    /// assert!("[('A1')]".parse::<InfoSpec>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            chars: s.char_indices().peekable(),
        };
        let mut entries = vec![];

        parser.expect('[', "`[`")?;
        if !parser.eat(']') {
            loop {
                parser.expect('(', "`(`")?;
                let station = parser.string()?;
                parser.expect(',', "`,`")?;
                let attribute = parser.string()?.parse()?;
                parser.eat(',');
                parser.expect(')', "`)`")?;
                entries.push(StationInfo { station, attribute });

                if parser.eat(']') {
                    break;
                }
                parser.expect(',', "`,` or `]`")?;
                if parser.eat(']') {
                    break;
                }
            }
        }
        parser.end()?;

        Ok(Self(entries))
    }
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        self.chars.next_if(|(_, c)| *c == expected).is_some()
    }

    fn expect(&mut self, expected: char, description: &'static str) -> Result<(), InfoSpecError> {
        self.skip_whitespace();
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((offset, found)) => Err(InfoSpecError::Unexpected {
                offset,
                found,
                expected: description,
            }),
            None => Err(InfoSpecError::UnexpectedEnd {
                expected: description,
            }),
        }
    }

    fn string(&mut self) -> Result<String, InfoSpecError> {
        const EXPECTED: &str = "quoted string";
        self.skip_whitespace();
        let quote = match self.chars.next() {
            Some((_, c @ ('\'' | '"'))) => c,
            Some((offset, found)) => {
                return Err(InfoSpecError::Unexpected {
                    offset,
                    found,
                    expected: EXPECTED,
                });
            }
            None => return Err(InfoSpecError::UnexpectedEnd { expected: EXPECTED }),
        };

        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => value.push(c),
                    None => return Err(InfoSpecError::UnexpectedEnd { expected: EXPECTED }),
                },
                Some((_, c)) if c == quote => return Ok(value),
                Some((_, c)) => value.push(c),
                None => return Err(InfoSpecError::UnexpectedEnd { expected: EXPECTED }),
            }
        }
    }

    fn end(&mut self) -> Result<(), InfoSpecError> {
        self.skip_whitespace();
        match self.chars.next() {
            None => Ok(()),
            Some((offset, found)) => Err(InfoSpecError::Unexpected {
                offset,
                found,
                expected: "end of input",
            }),
        }
    }
}
