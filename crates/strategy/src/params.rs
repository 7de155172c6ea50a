use std::collections::{BTreeMap, HashMap};

use common::{Error, Result};

/// A validated strategy parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Declared type and default of one parameter. The default also fixes the type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Int(i64),
    Float(f64),
    Str(&'static str),
}

/// One entry of a strategy's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: ParamDefault,
}

impl ParamSpec {
    pub const fn int(name: &'static str, default: i64) -> Self {
        Self { name, default: ParamDefault::Int(default) }
    }

    pub const fn float(name: &'static str, default: f64) -> Self {
        Self { name, default: ParamDefault::Float(default) }
    }

    pub const fn string(name: &'static str, default: &'static str) -> Self {
        Self { name, default: ParamDefault::Str(default) }
    }

    fn default_value(&self) -> ParamValue {
        match self.default {
            ParamDefault::Int(v) => ParamValue::Int(v),
            ParamDefault::Float(v) => ParamValue::Float(v),
            ParamDefault::Str(v) => ParamValue::Str(v.to_string()),
        }
    }

    /// Coerce a raw config value to this parameter's type.
    ///
    /// Integers are accepted for floats, integral floats for integers, and
    /// numeric strings (e.g. from `${VAR}` expansion) for either.
    fn coerce(&self, raw: &toml::Value) -> Option<ParamValue> {
        match (self.default, raw) {
            (ParamDefault::Int(_), toml::Value::Integer(v)) => Some(ParamValue::Int(*v)),
            (ParamDefault::Int(_), toml::Value::Float(v)) if v.fract() == 0.0 && v.is_finite() => {
                Some(ParamValue::Int(*v as i64))
            }
            (ParamDefault::Int(_), toml::Value::String(s)) => s.trim().parse().ok().map(ParamValue::Int),
            (ParamDefault::Float(_), toml::Value::Float(v)) => Some(ParamValue::Float(*v)),
            (ParamDefault::Float(_), toml::Value::Integer(v)) => Some(ParamValue::Float(*v as f64)),
            (ParamDefault::Float(_), toml::Value::String(s)) => {
                s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(ParamValue::Float)
            }
            (ParamDefault::Str(_), toml::Value::String(s)) => Some(ParamValue::Str(s.clone())),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self.default {
            ParamDefault::Int(_) => "integer",
            ParamDefault::Float(_) => "float",
            ParamDefault::Str(_) => "string",
        }
    }
}

/// Parameters validated against a strategy schema. Every schema entry is
/// present, either as configured or as its default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyParams(BTreeMap<String, ParamValue>);

impl StrategyParams {
    /// All defaults of `schema`.
    pub fn defaults(schema: &[ParamSpec]) -> Self {
        Self(
            schema
                .iter()
                .map(|spec| (spec.name.to_string(), spec.default_value()))
                .collect(),
        )
    }

    /// Validate raw config values for `strategy` against `schema`.
    ///
    /// Unknown keys and values that cannot be coerced to the declared type
    /// are `Error::Config`.
    pub fn validate(
        strategy: &str,
        schema: &[ParamSpec],
        raw: &HashMap<String, toml::Value>,
    ) -> Result<Self> {
        let mut unknown: Vec<&str> = raw
            .keys()
            .filter(|k| !schema.iter().any(|spec| spec.name == k.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(Error::Config(format!(
                "unknown parameter(s) {unknown:?} for strategy '{strategy}'"
            )));
        }

        let mut params = Self::defaults(schema);
        for spec in schema {
            let Some(value) = raw.get(spec.name) else { continue };
            let coerced = spec.coerce(value).ok_or_else(|| {
                Error::Config(format!(
                    "parameter '{}' of strategy '{strategy}' must be a {}, got {value}",
                    spec.name,
                    spec.type_name()
                ))
            })?;
            params.0.insert(spec.name.to_string(), coerced);
        }
        Ok(params)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer parameter as a non-negative count.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get_int(key).and_then(|v| usize::try_from(v).ok())
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Str(_) => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Override or add one value. Meant for building params in code.
    pub fn with(mut self, key: &str, value: ParamValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }
}
