use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Recognized engine parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<u32>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 200,
            temperature: 0.9,
            top_p: 1.0,
            n: 1,
            stop: None,
            stream: false,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            logprobs: None,
        }
    }
}

/// Rejected parameter update or invalid parameter set.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    UnknownKey(String),
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
    OutOfRange {
        key: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(key) => write!(f, "unknown engine parameter '{key}'"),
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid value '{value}' for '{key}': expected {expected}"),
            Self::OutOfRange {
                key,
                value,
                min,
                max,
            } => write!(f, "'{key}' = {value} is outside [{min}, {max}]"),
        }
    }
}

impl std::error::Error for ParamError {}

/// Loosely-typed value parsed from `key=value` text.
#[derive(Debug, Clone, PartialEq)]
enum RawValue {
    Bool(bool),
    None,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" | "True" => return Self::Bool(true),
            "false" | "False" => return Self::Bool(false),
            "none" | "None" | "null" => return Self::None,
            _ => {}
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Self::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return Self::Float(value);
        }
        Self::Text(trimmed.to_string())
    }
}

impl EngineParams {
    /// Checks ranges once at the boundary.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.model.trim().is_empty() {
            return Err(ParamError::InvalidValue {
                key: "model".to_string(),
                value: self.model.clone(),
                expected: "a non-empty model id",
            });
        }
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("n", f64::from(self.n), 1.0, 128.0)?;
        check_range("max_tokens", f64::from(self.max_tokens), 1.0, f64::from(u32::MAX))?;
        Ok(())
    }

    /// Applies one `key=value` update, coercing the value from text.
    ///
    /// The parameter set is left unchanged when the update is rejected.
    pub fn update(&mut self, key: &str, raw: &str) -> Result<(), ParamError> {
        let mut next = self.clone();
        let value = RawValue::parse(raw);
        let key = key.trim();
        match key {
            "model" => next.model = expect_text(key, raw, value)?,
            "max_tokens" => next.max_tokens = expect_u32(key, raw, value)?,
            "temperature" => next.temperature = expect_float(key, raw, value)?,
            "top_p" => next.top_p = expect_float(key, raw, value)?,
            "n" | "number" => next.n = expect_u32(key, raw, value)?,
            "stream" => next.stream = expect_bool(key, raw, value)?,
            "presence_penalty" => next.presence_penalty = expect_float(key, raw, value)?,
            "frequency_penalty" => next.frequency_penalty = expect_float(key, raw, value)?,
            "logprobs" => {
                next.logprobs = match value {
                    RawValue::None => None,
                    other => Some(expect_u32(key, raw, other)?),
                }
            }
            "stop" => {
                next.stop = match value {
                    RawValue::None => None,
                    _ => Some(
                        raw.split('|')
                            .map(|stop| unescape(stop.trim()))
                            .filter(|stop| !stop.is_empty())
                            .collect(),
                    ),
                }
            }
            unknown => return Err(ParamError::UnknownKey(unknown.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Applies a comma-separated `k1=v1,k2=v2` update list atomically.
    pub fn update_many(&mut self, pairs: &str) -> Result<(), ParamError> {
        let mut next = self.clone();
        for pair in pairs.split(',').filter(|pair| !pair.trim().is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(ParamError::InvalidValue {
                    key: pair.trim().to_string(),
                    value: String::new(),
                    expected: "key=value",
                });
            };
            next.update(key, value)?;
        }
        *self = next;
        Ok(())
    }
}

fn check_range(key: &'static str, value: f64, min: f64, max: f64) -> Result<(), ParamError> {
    if value.is_nan() || value < min || value > max {
        return Err(ParamError::OutOfRange {
            key,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn invalid(key: &str, raw: &str, expected: &'static str) -> ParamError {
    ParamError::InvalidValue {
        key: key.to_string(),
        value: raw.trim().to_string(),
        expected,
    }
}

fn expect_text(key: &str, raw: &str, value: RawValue) -> Result<String, ParamError> {
    match value {
        RawValue::Text(text) => Ok(text),
        RawValue::Int(_) | RawValue::Float(_) => Ok(raw.trim().to_string()),
        _ => Err(invalid(key, raw, "text")),
    }
}

fn expect_u32(key: &str, raw: &str, value: RawValue) -> Result<u32, ParamError> {
    match value {
        RawValue::Int(int) => u32::try_from(int).map_err(|_| invalid(key, raw, "a positive integer")),
        _ => Err(invalid(key, raw, "a positive integer")),
    }
}

fn expect_float(key: &str, raw: &str, value: RawValue) -> Result<f64, ParamError> {
    match value {
        RawValue::Float(float) => Ok(float),
        RawValue::Int(int) => Ok(int as f64),
        _ => Err(invalid(key, raw, "a number")),
    }
}

fn expect_bool(key: &str, raw: &str, value: RawValue) -> Result<bool, ParamError> {
    match value {
        RawValue::Bool(flag) => Ok(flag),
        _ => Err(invalid(key, raw, "true or false")),
    }
}

fn unescape(value: &str) -> String {
    value.replace("\\n", "\n").replace("\\t", "\t")
}

#[cfg(test)]
mod tests {
    use super::{EngineParams, ParamError};

    #[test]
    fn defaults_match_openai_baseline() {
        let params = EngineParams::default();
        assert_eq!(params.model, "gpt-3.5-turbo");
        assert_eq!(params.max_tokens, 200);
        assert_eq!(params.n, 1);
        assert!(params.stop.is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn update_coerces_ints_floats_bools_and_none() {
        let mut params = EngineParams::default();
        params.update("max_tokens", "512").expect("int update");
        params.update("temperature", "0.2").expect("float update");
        params.update("top_p", "1").expect("int accepted as float");
        params.update("stream", "True").expect("bool update");
        params.update("logprobs", "3").expect("optional int update");
        params.update("logprobs", "None").expect("none clears");

        assert_eq!(params.max_tokens, 512);
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.top_p, 1.0);
        assert!(params.stream);
        assert_eq!(params.logprobs, None);
    }

    #[test]
    fn number_alias_sets_n() {
        let mut params = EngineParams::default();
        params.update("number", "3").expect("alias update");
        assert_eq!(params.n, 3);
    }

    #[test]
    fn stop_sequences_split_on_pipes_and_unescape_newlines() {
        let mut params = EngineParams::default();
        params.update("stop", "\\nIn:|###").expect("stop update");
        assert_eq!(
            params.stop,
            Some(vec!["\nIn:".to_string(), "###".to_string()])
        );
    }

    #[test]
    fn rejected_update_leaves_params_unchanged() {
        let mut params = EngineParams::default();
        let before = params.clone();

        let error = params
            .update("temperature", "5")
            .expect_err("temperature above 2 must fail");
        assert!(matches!(error, ParamError::OutOfRange { key: "temperature", .. }));

        let error = params
            .update("bogus", "1")
            .expect_err("unknown key must fail");
        assert_eq!(error, ParamError::UnknownKey("bogus".to_string()));
        assert_eq!(params, before);
    }

    #[test]
    fn update_many_is_all_or_nothing() {
        let mut params = EngineParams::default();
        let before = params.clone();

        params
            .update_many("max_tokens=10,n=0")
            .expect_err("n=0 must fail");
        assert_eq!(params, before);

        params
            .update_many("max_tokens=10,model=gpt-4")
            .expect("valid batch");
        assert_eq!(params.max_tokens, 10);
        assert_eq!(params.model, "gpt-4");
    }

    #[test]
    fn unknown_fields_are_rejected_when_deserializing() {
        let error = serde_json::from_str::<EngineParams>(r#"{"model":"x","bogus":1}"#)
            .expect_err("unknown field must fail");
        assert!(error.to_string().contains("bogus"));

        let parsed = serde_json::from_str::<EngineParams>(r#"{"model":"gpt-4"}"#)
            .expect("partial params fill defaults");
        assert_eq!(parsed.max_tokens, 200);
    }
}
