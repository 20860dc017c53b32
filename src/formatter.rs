use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::BoxError;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";
pub const TEXT_PLAIN: &str = "text/plain";

/// A body codec. Values cross the codec boundary as a [`serde_json::Value`]
/// document so codecs stay object safe; typed conversion happens once per
/// target type on the response side.
pub trait Formatter: Any + Send + Sync {
    /// The content type written on encoded request bodies.
    fn media_type(&self) -> &'static str;

    fn can_read(&self, content_type: &str) -> bool;

    fn can_write(&self, content_type: &str) -> bool;

    fn encode(&self, value: &Value) -> Result<Bytes, BoxError>;

    fn decode(&self, body: &[u8]) -> Result<Value, BoxError>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Lowercased media type without parameters, e.g. `application/json` for
/// `Application/JSON; charset=utf-8`.
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn media_type(&self) -> &'static str {
        APPLICATION_JSON
    }

    fn can_read(&self, content_type: &str) -> bool {
        let essence = media_type_essence(content_type);
        essence == APPLICATION_JSON || essence == "text/json" || essence.ends_with("+json")
    }

    fn can_write(&self, content_type: &str) -> bool {
        self.can_read(content_type)
    }

    fn encode(&self, value: &Value) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(&self, body: &[u8]) -> Result<Value, BoxError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(body)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FormUrlEncodedFormatter;

impl Formatter for FormUrlEncodedFormatter {
    fn media_type(&self) -> &'static str {
        APPLICATION_FORM
    }

    fn can_read(&self, content_type: &str) -> bool {
        media_type_essence(content_type) == APPLICATION_FORM
    }

    fn can_write(&self, content_type: &str) -> bool {
        self.can_read(content_type)
    }

    fn encode(&self, value: &Value) -> Result<Bytes, BoxError> {
        let pairs = flatten_pairs(value)?
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value)))
            .collect::<Vec<_>>();
        Ok(Bytes::from(serde_urlencoded::to_string(pairs)?))
    }

    /// Repeated names collect into an array, mirroring `encode`.
    fn decode(&self, body: &[u8]) -> Result<Value, BoxError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)?;
        let mut object = Map::new();
        for (name, value) in pairs {
            let value = Value::String(value);
            match object.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    object.insert(name, value);
                }
            }
        }
        Ok(Value::Object(object))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextFormatter;

impl Formatter for PlainTextFormatter {
    fn media_type(&self) -> &'static str {
        TEXT_PLAIN
    }

    fn can_read(&self, content_type: &str) -> bool {
        media_type_essence(content_type) == TEXT_PLAIN
    }

    fn can_write(&self, content_type: &str) -> bool {
        self.can_read(content_type)
    }

    fn encode(&self, value: &Value) -> Result<Bytes, BoxError> {
        match value {
            Value::String(text) => Ok(Bytes::from(text.clone())),
            Value::Null => Ok(Bytes::new()),
            other => Ok(Bytes::from(other.to_string())),
        }
    }

    fn decode(&self, body: &[u8]) -> Result<Value, BoxError> {
        Ok(Value::String(String::from_utf8(body.to_vec())?))
    }
}

/// Flattens a document into ordered name/value pairs. `null` properties are
/// kept as `None` so callers decide whether to drop them; arrays repeat the
/// name once per element.
pub(crate) fn flatten_pairs(value: &Value) -> Result<Vec<(String, Option<String>)>, BoxError> {
    let Value::Object(object) = value else {
        return Err(format!("expected an object of named values, got {}", kind_of(value)).into());
    };

    let mut pairs = Vec::with_capacity(object.len());
    for (name, item) in object {
        match item {
            Value::Array(items) => {
                for element in items {
                    pairs.push((name.clone(), scalar_text(name, element)?));
                }
            }
            other => pairs.push((name.clone(), scalar_text(name, other)?)),
        }
    }
    Ok(pairs)
}

fn scalar_text(name: &str, value: &Value) -> Result<Option<String>, BoxError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::String(text) => Ok(Some(text.clone())),
        other => Err(format!("argument {name} must be a scalar, got {}", kind_of(other)).into()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ordered codec list; lookups pick the first match.
#[derive(Clone)]
pub struct FormatterRegistry {
    formatters: Vec<Arc<dyn Formatter>>,
}

impl FormatterRegistry {
    pub fn empty() -> Self {
        Self {
            formatters: Vec::new(),
        }
    }

    pub fn push(&mut self, formatter: impl Formatter + 'static) -> &mut Self {
        self.formatters.push(Arc::new(formatter));
        self
    }

    pub fn push_arc(&mut self, formatter: Arc<dyn Formatter>) -> &mut Self {
        self.formatters.push(formatter);
        self
    }

    /// Inserts ahead of the existing codecs so it wins ties.
    pub fn prepend(&mut self, formatter: impl Formatter + 'static) -> &mut Self {
        self.formatters.insert(0, Arc::new(formatter));
        self
    }

    /// Removes every codec of type `F`; returns whether any was removed.
    pub fn remove<F: Formatter>(&mut self) -> bool {
        let before = self.formatters.len();
        self.formatters.retain(|formatter| {
            let formatter: &dyn Any = &**formatter;
            !formatter.is::<F>()
        });
        before != self.formatters.len()
    }

    pub fn clear(&mut self) {
        self.formatters.clear();
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Formatter>> {
        self.formatters.iter()
    }

    /// A missing content type falls back to the first codec.
    pub fn reader_for(&self, content_type: Option<&str>) -> Option<&Arc<dyn Formatter>> {
        match content_type {
            Some(content_type) => self
                .formatters
                .iter()
                .find(|formatter| formatter.can_read(content_type)),
            None => self.formatters.first(),
        }
    }

    pub fn writer_for(&self, content_type: Option<&str>) -> Option<&Arc<dyn Formatter>> {
        match content_type {
            Some(content_type) => self
                .formatters
                .iter()
                .find(|formatter| formatter.can_write(content_type)),
            None => self.formatters.first(),
        }
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .push(JsonFormatter)
            .push(FormUrlEncodedFormatter)
            .push(PlainTextFormatter);
        registry
    }
}

impl std::fmt::Debug for FormatterRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_list()
            .entries(self.formatters.iter().map(|item| item.name()))
            .finish()
    }
}
