//! Typed, bounded tuning parameters and their text form.
//!
//! A parameter renders as
//! `<value='V' min='MIN' max='MAX' delta='D' tolerance='T' fixed='F'>` where
//! missing bounds are written as `None` and booleans as `True` / `False`.
//! Integers render without a decimal point and floats always carry one, so
//! the value kind survives a round trip through text.

use crate::util::{LocateError, LocateResult};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Value of a parameter; the kind is fixed when the parameter is created.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean switch.
    Bool(bool),
}

impl ParamValue {
    /// Returns the kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Bool(_) => "bool",
        }
    }

    /// Returns the value as a float (booleans map to 0 / 1).
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
            ParamValue::Bool(v) => f64::from(u8::from(v)),
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ParamValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v:?}"),
            ParamValue::Bool(true) => f.write_str("True"),
            ParamValue::Bool(false) => f.write_str("False"),
        }
    }
}

impl FromStr for ParamValue {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "True" => return Ok(ParamValue::Bool(true)),
            "False" => return Ok(ParamValue::Bool(false)),
            _ => {}
        }
        if !s.contains(['.', 'e', 'E']) {
            if let Ok(v) = s.parse::<i64>() {
                return Ok(ParamValue::Int(v));
            }
        }
        s.parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| malformed(format!("cannot parse parameter value '{s}'")))
    }
}

/// A named tuning knob with bounds, a calibration step, and a lock flag.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    value: ParamValue,
    min: Option<f64>,
    max: Option<f64>,
    delta: f64,
    tolerance: f64,
    fixed: bool,
}

impl Parameter {
    /// Creates a parameter with the default calibration step of its kind.
    ///
    /// Booleans get `delta = 0, tolerance = 1`, integers `delta = 1,
    /// tolerance = 0.9` and floats `delta = 1.0, tolerance = 0.1`. Fails with
    /// [`LocateError::OutOfRange`] when `value` violates the bounds.
    pub fn new(
        value: impl Into<ParamValue>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> LocateResult<Self> {
        let value = value.into();
        let (delta, tolerance) = default_step(&value);
        Self::from_parts(value, min, max, delta, tolerance, false)
    }

    /// Creates a parameter from every field, validating the bounds.
    pub fn from_parts(
        value: ParamValue,
        min: Option<f64>,
        max: Option<f64>,
        delta: f64,
        tolerance: f64,
        fixed: bool,
    ) -> LocateResult<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(LocateError::OutOfRange {
                    name: "min".to_owned(),
                    value: lo,
                    min: None,
                    max: Some(hi),
                });
            }
        }
        check_bounds(&value, min, max)?;
        Ok(Self {
            value,
            min,
            max,
            delta,
            tolerance,
            fixed,
        })
    }

    /// Builds a schema entry whose values are known to be consistent.
    pub(crate) const fn schema(
        value: ParamValue,
        min: Option<f64>,
        max: Option<f64>,
        delta: f64,
        tolerance: f64,
    ) -> Self {
        Self {
            value,
            min,
            max,
            delta,
            tolerance,
            fixed: false,
        }
    }

    /// Overrides the calibration step and convergence tolerance.
    pub fn with_step(mut self, delta: f64, tolerance: f64) -> Self {
        self.delta = delta;
        self.tolerance = tolerance;
        self
    }

    /// Sets the lock flag.
    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    /// Returns the current value.
    pub fn value(&self) -> ParamValue {
        self.value
    }

    /// Returns the lower bound.
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// Returns the upper bound.
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Returns the initial calibration step.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Returns the step below which calibration considers the value settled.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Returns true when calibration must leave the value alone.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub(crate) fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Assigns a new value of the same kind (integers widen into floats).
    pub fn set_value(&mut self, value: impl Into<ParamValue>) -> LocateResult<()> {
        let value = coerce(&self.value, value.into())?;
        check_bounds(&value, self.min, self.max)?;
        self.value = value;
        Ok(())
    }

    /// Clamps a candidate float into the bounds of this parameter.
    pub(crate) fn clamp(&self, value: f64) -> f64 {
        let value = self.min.map_or(value, |lo| value.max(lo));
        self.max.map_or(value, |hi| value.min(hi))
    }

    fn render_bound(&self, bound: Option<f64>) -> String {
        match (bound, &self.value) {
            (None, _) => "None".to_owned(),
            (Some(b), ParamValue::Int(_)) if b.fract() == 0.0 => format!("{}", b as i64),
            (Some(b), _) => format!("{b:?}"),
        }
    }
}

fn default_step(value: &ParamValue) -> (f64, f64) {
    match value {
        ParamValue::Bool(_) => (0.0, 1.0),
        ParamValue::Int(_) => (1.0, 0.9),
        ParamValue::Float(_) => (1.0, 0.1),
    }
}

fn coerce(current: &ParamValue, value: ParamValue) -> LocateResult<ParamValue> {
    match (current, value) {
        (ParamValue::Int(_), ParamValue::Int(_))
        | (ParamValue::Float(_), ParamValue::Float(_))
        | (ParamValue::Bool(_), ParamValue::Bool(_)) => Ok(value),
        (ParamValue::Float(_), ParamValue::Int(v)) => Ok(ParamValue::Float(v as f64)),
        _ => Err(LocateError::TypeMismatch {
            name: "value".to_owned(),
            expected: current.kind(),
            got: value.kind(),
        }),
    }
}

fn check_bounds(value: &ParamValue, min: Option<f64>, max: Option<f64>) -> LocateResult<()> {
    if matches!(value, ParamValue::Bool(_)) {
        return Ok(());
    }
    let v = value.as_f64();
    let below = min.is_some_and(|lo| v < lo);
    let above = max.is_some_and(|hi| v > hi);
    if below || above || v.is_nan() {
        return Err(LocateError::OutOfRange {
            name: "value".to_owned(),
            value: v,
            min,
            max,
        });
    }
    Ok(())
}

fn malformed(reason: String) -> LocateError {
    LocateError::MalformedConfig { line: 0, reason }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<value='{}' min='{}' max='{}' delta='{:?}' tolerance='{:?}' fixed='{}'>",
            self.value,
            self.render_bound(self.min),
            self.render_bound(self.max),
            self.delta,
            self.tolerance,
            ParamValue::Bool(self.fixed),
        )
    }
}

const FIELDS: [&str; 6] = ["value", "min", "max", "delta", "tolerance", "fixed"];

impl FromStr for Parameter {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .ok_or_else(|| malformed(format!("parameter '{s}' is not enclosed in <...>")))?;

        let fields = split_fields(body)?;
        if fields.len() != FIELDS.len() || fields.iter().zip(FIELDS).any(|((k, _), f)| *k != f) {
            return Err(malformed(format!(
                "parameter '{s}' must list {} in order",
                FIELDS.join(", ")
            )));
        }

        let value: ParamValue = fields[0].1.parse()?;
        let min = parse_bound(fields[1].1)?;
        let max = parse_bound(fields[2].1)?;
        let delta = parse_float(fields[3].1)?;
        let tolerance = parse_float(fields[4].1)?;
        let fixed = match fields[5].1.parse::<ParamValue>()? {
            ParamValue::Bool(b) => b,
            _ => return Err(malformed(format!("fixed flag '{}' is not a boolean", fields[5].1))),
        };
        Parameter::from_parts(value, min, max, delta, tolerance, fixed)
    }
}

fn split_fields(body: &str) -> LocateResult<Vec<(&str, &str)>> {
    let mut fields = Vec::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
        let (key, after) = rest
            .split_once('=')
            .ok_or_else(|| malformed(format!("expected key='value' in '{body}'")))?;
        let after = after
            .strip_prefix('\'')
            .ok_or_else(|| malformed(format!("value of '{}' is not quoted", key.trim())))?;
        let (value, tail) = after
            .split_once('\'')
            .ok_or_else(|| malformed(format!("unterminated value of '{}'", key.trim())))?;
        fields.push((key.trim(), value));
        rest = tail.trim_start();
    }
    Ok(fields)
}

fn parse_bound(text: &str) -> LocateResult<Option<f64>> {
    if text == "None" {
        return Ok(None);
    }
    parse_float(text).map(Some)
}

fn parse_float(text: &str) -> LocateResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| malformed(format!("cannot parse number '{text}'")))
}

/// Parameters of one category keyed by case-sensitive name.
///
/// Iteration follows sorted name order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    entries: BTreeMap<String, Parameter>,
}

impl ParameterSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, name: impl Into<String>, param: Parameter) {
        self.entries.insert(name.into(), param);
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.entries.get_mut(name)
    }

    /// Returns true when `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterates over `(name, parameter)` pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Parameter> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Parameter> {
        self.entries.iter_mut()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the set has no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = (&'a String, &'a Parameter);
    type IntoIter = btree_map::Iter<'a, String, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
