//! Value constraints attached to types.
//!
//! Constraints narrow the values a type admits: string length, a pattern,
//! numeric bounds, list size, an enumeration of options. They are not
//! checked against data here; the unifier combines the constraints of two
//! types into the constraints of their unification, which is the tighter of
//! each bound.

use serde_json::{Map, Number, Value};

/// A lower or upper numeric bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub value: Number,
    pub exclusive: bool,
}

impl Bound {
    pub fn new(value: impl Into<Number>, exclusive: bool) -> Self {
        Self {
            value: value.into(),
            exclusive,
        }
    }

    /// A bound from a float; `None` for NaN and infinities.
    pub fn from_f64(value: f64, exclusive: bool) -> Option<Self> {
        Number::from_f64(value).map(|value| Self { value, exclusive })
    }

    fn numeric(&self) -> f64 {
        self.value.as_f64().unwrap_or(f64::NAN)
    }

    /// The tighter of two lower bounds.
    fn max_lower(a: &Bound, b: &Bound) -> Bound {
        tighter(a, b, |x, y| x > y)
    }

    /// The tighter of two upper bounds.
    fn min_upper(a: &Bound, b: &Bound) -> Bound {
        tighter(a, b, |x, y| x < y)
    }
}

fn tighter(a: &Bound, b: &Bound, better: impl Fn(f64, f64) -> bool) -> Bound {
    let (x, y) = (a.numeric(), b.numeric());
    if better(x, y) {
        a.clone()
    } else if better(y, x) {
        b.clone()
    } else {
        Bound {
            value: a.value.clone(),
            exclusive: a.exclusive || b.exclusive,
        }
    }
}

/// Constraints on the values of a type. The default admits everything.
///
/// # Examples
///
/// ```
/// use blue_core::Constraints;
///
/// let base = Constraints { min_length: Some(1), ..Constraints::default() };
/// let derived = Constraints { min_length: Some(3), max_length: Some(8), ..Constraints::default() };
///
/// let both = base.intersect(&derived).unwrap();
/// assert_eq!((both.min_length, both.max_length), (Some(3), Some(8)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub required: bool,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    /// Every pattern must match. Kept sorted and deduplicated.
    pub patterns: Vec<String>,
    pub minimum: Option<Bound>,
    pub maximum: Option<Bound>,
    pub multiple_of: Option<u64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    /// The admitted values. Kept sorted by their JSON text and deduplicated.
    pub options: Option<Vec<Value>>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Add a pattern, keeping the list normalized.
    pub fn add_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if let Err(at) = self.patterns.binary_search(&pattern) {
            self.patterns.insert(at, pattern);
        }
    }

    /// Restrict values to `options`, keeping the list normalized.
    pub fn set_options(&mut self, options: impl IntoIterator<Item = Value>) {
        let mut options: Vec<Value> = options.into_iter().collect();
        options.sort_by_cached_key(Value::to_string);
        options.dedup();
        self.options = Some(options);
    }

    /// Constraints satisfied exactly by values satisfying both operands.
    ///
    /// Returns the reason when the result admits no value.
    pub fn intersect(&self, other: &Constraints) -> Result<Constraints, String> {
        let out = self.narrowed(other);
        out.check()?;
        Ok(out)
    }

    /// Both operands' constraints, without checking that a value is left.
    pub fn narrowed(&self, other: &Constraints) -> Constraints {
        let mut out = Constraints {
            required: self.required || other.required,
            min_length: merge(self.min_length, other.min_length, u64::max),
            max_length: merge(self.max_length, other.max_length, u64::min),
            patterns: self.patterns.clone(),
            minimum: merge_ref(&self.minimum, &other.minimum, Bound::max_lower),
            maximum: merge_ref(&self.maximum, &other.maximum, Bound::min_upper),
            multiple_of: merge(self.multiple_of, other.multiple_of, lcm),
            min_items: merge(self.min_items, other.min_items, u64::max),
            max_items: merge(self.max_items, other.max_items, u64::min),
            unique_items: self.unique_items || other.unique_items,
            options: match (&self.options, &other.options) {
                (Some(a), Some(b)) => Some(a.iter().filter(|v| b.contains(v)).cloned().collect()),
                (a, b) => a.clone().or_else(|| b.clone()),
            },
        };
        for pattern in &other.patterns {
            out.add_pattern(pattern.clone());
        }
        out
    }

    /// Whether some value can satisfy these constraints.
    pub fn check(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(format!("minLength {min} exceeds maxLength {max}"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_items, self.max_items) {
            if min > max {
                return Err(format!("minItems {min} exceeds maxItems {max}"));
            }
        }
        if let (Some(lower), Some(upper)) = (&self.minimum, &self.maximum) {
            let (lo, hi) = (lower.numeric(), upper.numeric());
            if lo > hi || (lo == hi && (lower.exclusive || upper.exclusive)) {
                return Err(format!(
                    "the range from {} to {} is empty",
                    lower.value, upper.value
                ));
            }
        }
        if self.multiple_of == Some(0) {
            return Err("multipleOf must be positive".to_string());
        }
        if self.options.as_ref().is_some_and(Vec::is_empty) {
            return Err("no option is admitted".to_string());
        }
        Ok(())
    }

    /// The `constraints:` form, with keys in a fixed order.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if self.required {
            out.insert("required".into(), Value::Bool(true));
        }
        insert_count(&mut out, "minLength", self.min_length);
        insert_count(&mut out, "maxLength", self.max_length);
        match self.patterns.as_slice() {
            [] => {}
            [pattern] => {
                out.insert("pattern".into(), Value::String(pattern.clone()));
            }
            patterns => {
                let patterns = patterns.iter().cloned().map(Value::String).collect();
                out.insert("pattern".into(), Value::Array(patterns));
            }
        }
        if let Some(bound) = &self.minimum {
            let key = if bound.exclusive { "exclusiveMinimum" } else { "minimum" };
            out.insert(key.into(), Value::Number(bound.value.clone()));
        }
        if let Some(bound) = &self.maximum {
            let key = if bound.exclusive { "exclusiveMaximum" } else { "maximum" };
            out.insert(key.into(), Value::Number(bound.value.clone()));
        }
        insert_count(&mut out, "multipleOf", self.multiple_of);
        insert_count(&mut out, "minItems", self.min_items);
        insert_count(&mut out, "maxItems", self.max_items);
        if self.unique_items {
            out.insert("uniqueItems".into(), Value::Bool(true));
        }
        if let Some(options) = &self.options {
            out.insert("options".into(), Value::Array(options.clone()));
        }
        Value::Object(out)
    }
}

fn insert_count(out: &mut Map<String, Value>, key: &str, value: Option<u64>) {
    if let Some(value) = value {
        out.insert(key.into(), Value::Number(value.into()));
    }
}

fn merge<T: Copy>(a: Option<T>, b: Option<T>, f: impl Fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    }
}

fn merge_ref<T: Clone>(a: &Option<T>, b: &Option<T>, f: impl Fn(&T, &T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.clone().or_else(|| b.clone()),
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b)).saturating_mul(b)
}
