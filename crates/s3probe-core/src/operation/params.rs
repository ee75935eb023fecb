use std::collections::BTreeMap;

use crate::errors::ParameterError;
use crate::model::{ParamValue, Params};

/// Typed accessors over a raw parameter map, reporting errors against one operation.
#[derive(Debug, Clone, Copy)]
pub struct ParamReader<'a> {
    operation: &'a str,
    params: &'a Params,
}

impl<'a> ParamReader<'a> {
    pub fn new(operation: &'a str, params: &'a Params) -> Self {
        Self { operation, params }
    }

    pub fn error(&self, field: &str, reason: impl Into<String>) -> ParameterError {
        ParameterError::new(self.operation, field, reason)
    }

    pub fn get(&self, field: &str) -> Option<&'a ParamValue> {
        self.params.get(field)
    }

    pub fn require_str(&self, field: &str) -> Result<String, ParameterError> {
        match self.opt_str(field)? {
            Some(s) if !s.is_empty() => Ok(s),
            Some(_) => Err(self.error(field, "must not be empty")),
            None => Err(ParameterError::missing(self.operation, field)),
        }
    }

    /// Scalars (text, numbers, booleans) are accepted and rendered as text.
    pub fn opt_str(&self, field: &str) -> Result<Option<String>, ParameterError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value
                .to_scalar_string()
                .map(Some)
                .ok_or_else(|| self.error(field, "expected a string")),
        }
    }

    pub fn opt_bool(&self, field: &str) -> Result<Option<bool>, ParameterError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.error(field, "expected a boolean")),
        }
    }

    pub fn opt_i64(&self, field: &str) -> Result<Option<i64>, ParameterError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.error(field, "expected an integer")),
        }
    }

    /// A flat string map, e.g. object metadata or tags.
    pub fn opt_string_map(
        &self,
        field: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ParameterError> {
        let Some(value) = self.get(field) else {
            return Ok(None);
        };
        let map = value
            .as_map()
            .ok_or_else(|| self.error(field, "expected a mapping"))?;
        map.iter()
            .map(|(k, v)| {
                v.to_scalar_string()
                    .map(|s| (k.clone(), s))
                    .ok_or_else(|| self.error(field, format!("value for '{k}' must be a scalar")))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Some)
    }

    /// Payload bytes: either materialized file contents or literal text.
    pub fn opt_bytes(&self, field: &str) -> Result<Option<Vec<u8>>, ParameterError> {
        match self.get(field) {
            None => Ok(None),
            Some(value) => value
                .to_bytes()
                .map(Some)
                .ok_or_else(|| self.error(field, "expected text or bytes")),
        }
    }
}
