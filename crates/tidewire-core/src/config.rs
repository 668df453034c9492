//! Layered configuration lookup.
//!
//! A [`Config`] holds an ordered list of [`ConfigSource`]s. Lookups walk the
//! sources from the most recently added to the oldest, so later sources
//! override earlier ones key by key:
//!
//! ```
//! use tidewire_core::config::{Config, MemorySource};
//!
//! let defaults = MemorySource::new("defaults");
//! defaults.set("server", "port", 7000);
//! defaults.set("server", "workers", 4);
//!
//! let overrides = MemorySource::new("overrides");
//! overrides.set("server", "port", "7100");
//!
//! let config = Config::new();
//! config.add_source(defaults);
//! config.add_source(overrides);
//!
//! assert_eq!(config.get::<u16>("server", "port"), Some(7100));
//! assert_eq!(config.get::<usize>("server", "workers"), Some(4));
//! assert_eq!(config.get_or("server", "backlog", 16), 16);
//! ```
//!
//! File-backed sources are available for INI ([`IniConfigSource`]) and JSON
//! ([`JsonConfigSource`]) documents. Both are organised as sections of
//! key/value pairs.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ini::Ini;
use parking_lot::RwLock;

use crate::error::ConfigError;
use crate::logging::targets;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    /// Infer a typed value from raw INI text.
    ///
    /// `true`/`false` in any case become booleans. Integers may carry a sign
    /// and a `0x` (hex) or leading `0` (octal) prefix. Whole-string floats
    /// become floats and anything else stays a string.
    pub fn infer(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
            return Self::Bool(raw.eq_ignore_ascii_case("true"));
        }
        if let Some(i) = parse_prefixed_integer(raw) {
            return Self::Integer(i);
        }
        if raw.bytes().any(|b| b.is_ascii_digit())
            && let Ok(f) = raw.parse::<f64>()
        {
            return Self::Float(f);
        }
        Self::String(raw.to_string())
    }

    /// Name of the held type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// Parse a C-style integer literal: optional sign, then `0x`/`0X` hex,
/// `0`-prefixed octal or plain decimal.
fn parse_prefixed_integer(raw: &str) -> Option<i64> {
    let (negative, unsigned) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let (radix, digits) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u16> for ConfigValue {
    fn from(v: u16) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Conversion from a stored [`ConfigValue`] to a requested type.
///
/// Returning `None` means "this value cannot be read as `Self`"; [`Config`]
/// then keeps searching older sources.
pub trait FromConfigValue: Sized {
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for ConfigValue {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Integer(i) => Some(*i != 0),
            ConfigValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            ConfigValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.to_string())
    }
}

fn integer_of(value: &ConfigValue) -> Option<i64> {
    match value {
        ConfigValue::Integer(i) => Some(*i),
        ConfigValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        ConfigValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

macro_rules! impl_from_config_integer {
    ($($t:ty),*) => {
        $(
            impl FromConfigValue for $t {
                fn from_config_value(value: &ConfigValue) -> Option<Self> {
                    integer_of(value).and_then(|i| <$t>::try_from(i).ok())
                }
            }
        )*
    };
}

impl_from_config_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromConfigValue for f64 {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Integer(i) => Some(*i as f64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            ConfigValue::Bool(_) => None,
        }
    }
}

impl FromConfigValue for f32 {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        f64::from_config_value(value).map(|f| f as f32)
    }
}

/// Values of one section, keyed by name.
pub type Section = HashMap<String, ConfigValue>;

type Sections = HashMap<String, Section>;

fn lookup(sections: &Sections, section: &str, key: &str) -> Option<ConfigValue> {
    sections.get(section)?.get(key).cloned()
}

/// A provider of sectioned configuration values.
pub trait ConfigSource: Send + Sync {
    /// Human-readable name, usually the backing file path.
    fn name(&self) -> &str;

    /// Re-read the backing store. On failure the previous values are kept.
    fn reload(&self) -> Result<(), ConfigError>;

    /// Look up a single value.
    fn find(&self, section: &str, key: &str) -> Option<ConfigValue>;
}

/// In-memory source for defaults and programmatic overrides.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    sections: RwLock<Sections>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: RwLock::new(HashMap::new()),
        }
    }

    /// Set `section.key` to `value`, replacing any previous value.
    pub fn set(&self, section: &str, key: &str, value: impl Into<ConfigValue>) {
        self.sections
            .write()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Remove `section.key`, returning the old value.
    pub fn remove(&self, section: &str, key: &str) -> Option<ConfigValue> {
        self.sections.write().get_mut(section)?.remove(key)
    }
}

impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn reload(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn find(&self, section: &str, key: &str) -> Option<ConfigValue> {
        lookup(&self.sections.read(), section, key)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
}

/// Parse INI text into typed sections. Keys outside any section are ignored.
pub fn parse_ini(content: &str) -> Result<HashMap<String, Section>, ini::ParseError> {
    let ini = Ini::load_from_str(content)?;
    let mut sections = Sections::new();

    for (section, props) in ini.iter() {
        let Some(section) = section else {
            continue;
        };
        let entry = sections.entry(section.trim().to_string()).or_default();
        for (key, value) in props.iter() {
            entry.insert(key.trim().to_string(), ConfigValue::infer(value));
        }
    }

    Ok(sections)
}

/// Render a value so that [`ConfigValue::infer`] reads it back unchanged.
fn format_ini_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{f:.1}"),
        other => other.to_string(),
    }
}

/// Write `sections` to `path` as INI, sections and keys in sorted order.
fn write_ini(path: &Path, sections: &Sections) -> Result<(), ConfigError> {
    let mut names: Vec<&String> = sections.keys().collect();
    names.sort();

    let mut ini = Ini::new();
    for name in names {
        let mut entries: Vec<(&String, &ConfigValue)> = sections[name].iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            ini.with_section(Some(name.as_str()))
                .set(key.as_str(), format_ini_value(value));
        }
    }

    ini.write_to_file(path).map_err(|e| ConfigError::io(path, e))?;
    tracing::debug!(
        target: targets::CONFIG,
        path = %path.display(),
        sections = sections.len(),
        "saved ini config"
    );
    Ok(())
}

/// Parse a JSON document of the form `{ "section": { "key": value } }`.
///
/// Nested objects, arrays and nulls inside a section are skipped.
pub fn parse_json(content: &str) -> Result<HashMap<String, Section>, JsonStructureError> {
    let root: serde_json::Value =
        serde_json::from_str(content).map_err(JsonStructureError::Syntax)?;
    let serde_json::Value::Object(root) = root else {
        return Err(JsonStructureError::NotAnObject);
    };

    let mut sections = Sections::new();
    for (name, body) in root {
        let serde_json::Value::Object(body) = body else {
            continue;
        };
        let section: Section = body
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    serde_json::Value::Bool(b) => ConfigValue::Bool(b),
                    serde_json::Value::Number(n) => match n.as_i64() {
                        Some(i) => ConfigValue::Integer(i),
                        None => ConfigValue::Float(n.as_f64()?),
                    },
                    serde_json::Value::String(s) => ConfigValue::String(s),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();
        sections.insert(name, section);
    }

    Ok(sections)
}

/// Reasons a JSON document cannot be used as configuration.
#[derive(Debug, thiserror::Error)]
pub enum JsonStructureError {
    #[error("{0}")]
    Syntax(#[source] serde_json::Error),
    #[error("top-level value must be an object of sections")]
    NotAnObject,
}

/// INI file source.
#[derive(Debug)]
pub struct IniConfigSource {
    name: String,
    path: PathBuf,
    sections: RwLock<Sections>,
}

impl IniConfigSource {
    /// Open and load `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let source = Self {
            name: path.display().to_string(),
            path,
            sections: RwLock::new(HashMap::new()),
        };
        source.reload()?;
        Ok(source)
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set `section.key` in memory. The file is untouched until a save, and
    /// a [`reload`](ConfigSource::reload) before then discards the change.
    pub fn set(&self, section: &str, key: &str, value: impl Into<ConfigValue>) {
        self.sections
            .write()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Write every section back to the backing file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&self.path)
    }

    /// Write every section to `path`, replacing its contents.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_ini(path.as_ref(), &self.sections.read())
    }

    /// Write a single section to `path`, replacing its contents.
    pub fn save_section(&self, path: impl AsRef<Path>, section: &str) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let sections = self.sections.read();
        let body = sections
            .get(section)
            .ok_or_else(|| ConfigError::missing(path, section))?;
        write_ini(path, &Sections::from([(section.to_string(), body.clone())]))
    }

    /// Write a single key, inside its section header, to `path`.
    pub fn save_key(
        &self,
        path: impl AsRef<Path>,
        section: &str,
        key: &str,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let value = self
            .find(section, key)
            .ok_or_else(|| ConfigError::missing(path, format!("{section}.{key}")))?;
        let body = Section::from([(key.to_string(), value)]);
        write_ini(path, &Sections::from([(section.to_string(), body)]))
    }
}

impl ConfigSource for IniConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn reload(&self) -> Result<(), ConfigError> {
        let content = read_file(&self.path)?;
        let sections =
            parse_ini(&content).map_err(|e| ConfigError::parse(&self.path, e.to_string()))?;
        tracing::debug!(
            target: targets::CONFIG,
            path = %self.path.display(),
            sections = sections.len(),
            "loaded ini config"
        );
        *self.sections.write() = sections;
        Ok(())
    }

    fn find(&self, section: &str, key: &str) -> Option<ConfigValue> {
        lookup(&self.sections.read(), section, key)
    }
}

/// JSON file source.
#[derive(Debug)]
pub struct JsonConfigSource {
    name: String,
    path: PathBuf,
    sections: RwLock<Sections>,
}

impl JsonConfigSource {
    /// Open and load `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let source = Self {
            name: path.display().to_string(),
            path,
            sections: RwLock::new(HashMap::new()),
        };
        source.reload()?;
        Ok(source)
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonConfigSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn reload(&self) -> Result<(), ConfigError> {
        let content = read_file(&self.path)?;
        let sections = parse_json(&content).map_err(|e| match e {
            JsonStructureError::Syntax(e) => ConfigError::parse(&self.path, e.to_string()),
            other => ConfigError::invalid_structure(&self.path, other.to_string()),
        })?;
        tracing::debug!(
            target: targets::CONFIG,
            path = %self.path.display(),
            sections = sections.len(),
            "loaded json config"
        );
        *self.sections.write() = sections;
        Ok(())
    }

    fn find(&self, section: &str, key: &str) -> Option<ConfigValue> {
        lookup(&self.sections.read(), section, key)
    }
}

/// Ordered stack of configuration sources.
#[derive(Default)]
pub struct Config {
    sources: RwLock<Vec<Arc<dyn ConfigSource>>>,
}

impl Config {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a source on top of the stack.
    pub fn add_source(&self, source: impl ConfigSource + 'static) {
        self.add_shared_source(Arc::new(source));
    }

    /// Push a source that is also held elsewhere.
    pub fn add_shared_source(&self, source: Arc<dyn ConfigSource>) {
        tracing::debug!(target: targets::CONFIG, source = source.name(), "config source added");
        self.sources.write().push(source);
    }

    /// Remove every source.
    pub fn clear_sources(&self) {
        self.sources.write().clear();
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }

    /// Reload every source.
    ///
    /// All sources are attempted even if one fails; the first failure is
    /// returned.
    pub fn reload_all(&self) -> Result<(), ConfigError> {
        let mut first_error = None;
        for source in self.snapshot() {
            if let Err(e) = source.reload() {
                tracing::warn!(
                    target: targets::CONFIG,
                    source = source.name(),
                    error = %e,
                    "reload failed"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Look up `section.key` as `T`.
    ///
    /// Sources are searched newest first. A value that exists but cannot be
    /// converted to `T` is skipped in favour of older sources.
    pub fn get<T: FromConfigValue>(&self, section: &str, key: &str) -> Option<T> {
        self.snapshot()
            .iter()
            .rev()
            .filter_map(|source| source.find(section, key))
            .find_map(|value| T::from_config_value(&value))
    }

    /// Look up `section.key`, falling back to `default`.
    pub fn get_or<T: FromConfigValue>(&self, section: &str, key: &str, default: T) -> T {
        self.get(section, key).unwrap_or(default)
    }

    /// Whether any source defines `section.key`.
    pub fn contains(&self, section: &str, key: &str) -> bool {
        self.snapshot()
            .iter()
            .any(|source| source.find(section, key).is_some())
    }

    fn snapshot(&self) -> Vec<Arc<dyn ConfigSource>> {
        self.sources.read().clone()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        f.debug_struct("Config").field("sources", &names).finish()
    }
}

static_assertions::assert_impl_all!(Config: Send, Sync);
