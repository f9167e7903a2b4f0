//! Dice formula language
//!
//! A small, closed grammar for macro-style rolls such as
//! `2d10+@agility`, `3d10kh2-1` or `d6+2d4+3`:
//!
//! ```text
//! formula := ['+' | '-'] term (('+' | '-') term)*
//! term    := INT | [INT] 'd' INT [('kh' | 'kl') INT] | '@' NAME
//! ```
//!
//! Attribute references are resolved against a caller-supplied map at
//! evaluation time. Nothing outside this grammar can be expressed.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::dice::DiceEngine;

/// Maximum dice in one group
pub const MAX_DICE: u32 = 100;

/// Maximum sides on one die
pub const MAX_SIDES: u32 = 1000;

/// Maximum terms in one formula
pub const MAX_TERMS: usize = 32;

/// Formula parse and evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("empty formula")]
    Empty,

    #[error("unexpected '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("expected a term after operator")]
    MissingTerm,

    #[error("missing die sides after 'd'")]
    MissingSides,

    #[error("missing count after keep modifier")]
    MissingKeepCount,

    #[error("missing attribute name after '@'")]
    MissingAttributeName,

    #[error("number too large: {0}")]
    InvalidNumber(String),

    #[error("dice count must be at least 1")]
    ZeroDice,

    #[error("die sides must be at least 1")]
    ZeroSides,

    #[error("too many dice in one group ({0} > 100)")]
    TooManyDice(u32),

    #[error("too many sides on one die ({0} > 1000)")]
    TooManySides(u32),

    #[error("too many terms (max 32)")]
    TooManyTerms,

    #[error("cannot keep {keep} of {count} dice")]
    KeepOutOfRange { keep: u32, count: u32 },

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),
}

/// Which dice of a group count toward the total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    Highest(u32),
    Lowest(u32),
}

/// One operand of a formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Constant(i64),
    Dice {
        count: u32,
        sides: u32,
        keep: Option<Keep>,
    },
    Attribute(String),
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Constant(n) => write!(f, "{}", n),
            Term::Dice { count, sides, keep } => {
                write!(f, "{}d{}", count, sides)?;
                match keep {
                    Some(Keep::Highest(n)) => write!(f, "kh{}", n),
                    Some(Keep::Lowest(n)) => write!(f, "kl{}", n),
                    None => Ok(()),
                }
            }
            Term::Attribute(name) => write!(f, "@{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedTerm {
    negative: bool,
    term: Term,
}

/// A parsed formula, ready to evaluate any number of times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    terms: Vec<SignedTerm>,
}

/// Per-term breakdown of an evaluation
#[derive(Debug, Clone, Serialize)]
pub struct TermOutcome {
    pub term: String,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    /// Signed contribution to the total
    pub value: i64,
}

/// Result of evaluating a formula
#[derive(Debug, Clone, Serialize)]
pub struct FormulaResult {
    pub formula: String,
    pub total: i64,
    pub parts: Vec<TermOutcome>,
}

impl Formula {
    /// Terms in source order
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.iter().map(|t| &t.term)
    }

    /// Attribute names this formula needs
    pub fn attributes(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter_map(|t| match &t.term {
                Term::Attribute(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Roll the formula
    pub fn evaluate(
        &self,
        engine: &mut DiceEngine,
        attributes: &HashMap<String, i32>,
    ) -> Result<FormulaResult, FormulaError> {
        let mut parts = Vec::with_capacity(self.terms.len());
        let mut total: i64 = 0;

        for signed in &self.terms {
            let (rolls, kept, magnitude) = match &signed.term {
                Term::Constant(n) => (Vec::new(), Vec::new(), *n),
                Term::Attribute(name) => (Vec::new(), Vec::new(), attribute(attributes, name)?),
                Term::Dice { count, sides, keep } => {
                    let rolls = engine.roll_many(*count, *sides);
                    let kept = keep_dice(&rolls, *keep);
                    let sum: u32 = kept.iter().sum();
                    (rolls, kept, sum as i64)
                }
            };

            let value = if signed.negative { -magnitude } else { magnitude };
            total += value;
            parts.push(TermOutcome {
                term: signed.term.to_string(),
                rolls,
                kept,
                value,
            });
        }

        Ok(FormulaResult {
            formula: self.to_string(),
            total,
            parts,
        })
    }

    /// Lowest and highest possible totals
    pub fn bounds(&self, attributes: &HashMap<String, i32>) -> Result<(i64, i64), FormulaError> {
        let mut low: i64 = 0;
        let mut high: i64 = 0;

        for signed in &self.terms {
            let (min, max) = match &signed.term {
                Term::Constant(n) => (*n, *n),
                Term::Attribute(name) => {
                    let value = attribute(attributes, name)?;
                    (value, value)
                }
                Term::Dice { count, sides, keep } => {
                    let counted = match keep {
                        Some(Keep::Highest(n)) | Some(Keep::Lowest(n)) => *n,
                        None => *count,
                    };
                    (counted as i64, counted as i64 * *sides as i64)
                }
            };

            if signed.negative {
                low -= max;
                high -= min;
            } else {
                low += min;
                high += max;
            }
        }

        Ok((low, high))
    }
}

/// Attribute names are case-insensitive; `name` is already lowercase
fn attribute(attributes: &HashMap<String, i32>, name: &str) -> Result<i64, FormulaError> {
    attributes
        .get(name)
        .or_else(|| {
            attributes
                .iter()
                .find(|(key, _)| key.to_lowercase() == name)
                .map(|(_, value)| value)
        })
        .map(|value| i64::from(*value))
        .ok_or_else(|| FormulaError::UnknownAttribute(name.to_string()))
}

fn keep_dice(rolls: &[u32], keep: Option<Keep>) -> Vec<u32> {
    let mut sorted = rolls.to_vec();
    match keep {
        None => sorted,
        Some(Keep::Highest(n)) => {
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            sorted.truncate(n as usize);
            sorted
        }
        Some(Keep::Lowest(n)) => {
            sorted.sort_unstable();
            sorted.truncate(n as usize);
            sorted
        }
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, signed) in self.terms.iter().enumerate() {
            if signed.negative {
                write!(f, "-")?;
            } else if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{}", signed.term)?;
        }
        Ok(())
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_formula(s)
    }
}

/// Parse a formula string like "2d10+@agility-1"
pub fn parse_formula(input: &str) -> Result<Formula, FormulaError> {
    let mut parser = Parser {
        chars: input.to_lowercase().chars().collect(),
        pos: 0,
    };

    parser.skip_ws();
    if parser.peek().is_none() {
        return Err(FormulaError::Empty);
    }

    let mut negative = false;
    match parser.peek() {
        Some('-') => {
            negative = true;
            parser.pos += 1;
        }
        Some('+') => parser.pos += 1,
        _ => {}
    }

    let mut terms = Vec::new();
    loop {
        parser.skip_ws();
        let term = parser.term()?;
        if terms.len() == MAX_TERMS {
            return Err(FormulaError::TooManyTerms);
        }
        terms.push(SignedTerm { negative, term });

        parser.skip_ws();
        match parser.peek() {
            None => break,
            Some('+') => negative = false,
            Some('-') => negative = true,
            Some(ch) => {
                return Err(FormulaError::UnexpectedChar {
                    ch,
                    pos: parser.pos,
                })
            }
        }
        parser.pos += 1;
    }

    Ok(Formula { terms })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<Option<u64>, FormulaError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse::<u64>()
            .ok()
            .filter(|n| *n <= i32::MAX as u64)
            .map(Some)
            .ok_or(FormulaError::InvalidNumber(digits))
    }

    fn term(&mut self) -> Result<Term, FormulaError> {
        match self.peek() {
            None => Err(FormulaError::MissingTerm),
            Some('@') => {
                self.pos += 1;
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    self.pos += 1;
                }
                if start == self.pos {
                    return Err(FormulaError::MissingAttributeName);
                }
                Ok(Term::Attribute(self.chars[start..self.pos].iter().collect()))
            }
            Some(c) if c.is_ascii_digit() || c == 'd' => {
                let count = self.number()?;
                if self.peek() != Some('d') {
                    // A bare number; count is Some because c was a digit
                    return Ok(Term::Constant(count.unwrap_or(0) as i64));
                }
                self.pos += 1;

                let count = count.unwrap_or(1) as u32;
                let sides = self.number()?.ok_or(FormulaError::MissingSides)? as u32;
                let keep = self.keep()?;
                validate_dice(count, sides, keep)?;

                Ok(Term::Dice { count, sides, keep })
            }
            Some(ch) => Err(FormulaError::UnexpectedChar { ch, pos: self.pos }),
        }
    }

    fn keep(&mut self) -> Result<Option<Keep>, FormulaError> {
        if self.peek() != Some('k') {
            return Ok(None);
        }
        self.pos += 1;

        let highest = match self.peek() {
            Some('h') => true,
            Some('l') => false,
            Some(ch) => return Err(FormulaError::UnexpectedChar { ch, pos: self.pos }),
            None => return Err(FormulaError::MissingKeepCount),
        };
        self.pos += 1;

        let n = self.number()?.ok_or(FormulaError::MissingKeepCount)? as u32;
        Ok(Some(if highest {
            Keep::Highest(n)
        } else {
            Keep::Lowest(n)
        }))
    }
}

fn validate_dice(count: u32, sides: u32, keep: Option<Keep>) -> Result<(), FormulaError> {
    if count == 0 {
        return Err(FormulaError::ZeroDice);
    }
    if count > MAX_DICE {
        return Err(FormulaError::TooManyDice(count));
    }
    if sides == 0 {
        return Err(FormulaError::ZeroSides);
    }
    if sides > MAX_SIDES {
        return Err(FormulaError::TooManySides(sides));
    }
    if let Some(Keep::Highest(n) | Keep::Lowest(n)) = keep {
        if n == 0 || n > count {
            return Err(FormulaError::KeepOutOfRange { keep: n, count });
        }
    }
    Ok(())
}
