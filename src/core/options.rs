//! Engine configuration store.
//!
//! String-valued options, validated at write time. Before the engine
//! is initialized clients write here directly; afterwards all writes
//! are routed through the dispatch queue as property sets, so the
//! store is only ever mutated from one thread at a time.

use std::collections::HashMap;

/// Validation outcome for an option write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionError {
    /// The option requires a non-empty value.
    MissingParam,
    /// The value does not parse for this option's type.
    Invalid,
    /// The value parses but is outside the accepted range.
    OutOfRange,
    /// No option with that name exists.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
enum OptionType {
    Flag,
    Float { min: f64, max: f64 },
    Text,
}

// Option table: name, type, default.
const OPTIONS: &[(&str, OptionType, &str)] = &[
    ("idle", OptionType::Flag, "no"),
    ("terminal", OptionType::Flag, "yes"),
    ("osc", OptionType::Flag, "yes"),
    ("loop", OptionType::Flag, "no"),
    ("pause", OptionType::Flag, "no"),
    ("title", OptionType::Text, ""),
    ("volume", OptionType::Float { min: 0.0, max: 130.0 }, "100"),
    ("speed", OptionType::Float { min: 0.01, max: 100.0 }, "1.0"),
    ("start", OptionType::Float { min: 0.0, max: f64::MAX }, "0"),
];

/// String-keyed option values with per-option validation.
#[derive(Debug)]
pub struct OptionStore {
    values: HashMap<&'static str, String>,
}

impl Default for OptionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionStore {
    pub fn new() -> OptionStore {
        let values = OPTIONS
            .iter()
            .map(|&(name, _, default)| (name, default.to_string()))
            .collect();
        OptionStore { values }
    }

    fn entry(name: &str) -> Option<(&'static str, OptionType)> {
        OPTIONS
            .iter()
            .find(|&&(n, _, _)| n == name)
            .map(|&(n, ty, _)| (n, ty))
    }

    /// Validate and store a value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), OptionError> {
        let (key, ty) = Self::entry(name).ok_or(OptionError::Unknown)?;
        match ty {
            OptionType::Flag => {
                if value.is_empty() {
                    return Err(OptionError::MissingParam);
                }
                if value != "yes" && value != "no" {
                    return Err(OptionError::Invalid);
                }
            }
            OptionType::Float { min, max } => {
                if value.is_empty() {
                    return Err(OptionError::MissingParam);
                }
                let num: f64 = value.parse().map_err(|_| OptionError::Invalid)?;
                if !num.is_finite() {
                    return Err(OptionError::Invalid);
                }
                if num < min || num > max {
                    return Err(OptionError::OutOfRange);
                }
            }
            OptionType::Text => {}
        }
        self.values.insert(key, value.to_string());
        Ok(())
    }

    /// Raw value, `None` for unknown options.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Flag option as bool. Unknown names read as false.
    pub fn get_flag(&self, name: &str) -> bool {
        self.get(name) == Some("yes")
    }

    /// Numeric option. Values are validated at write time, so this
    /// only fails for unknown names.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name)?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = OptionStore::new();
        assert_eq!(opts.get("idle"), Some("no"));
        assert!(opts.get_flag("terminal"));
        assert_eq!(opts.get_f64("volume"), Some(100.0));
        assert_eq!(opts.get("nonsense"), None);
    }

    #[test]
    fn test_flag_validation() {
        let mut opts = OptionStore::new();
        assert_eq!(opts.set("idle", "yes"), Ok(()));
        assert!(opts.get_flag("idle"));
        assert_eq!(opts.set("idle", ""), Err(OptionError::MissingParam));
        assert_eq!(opts.set("idle", "maybe"), Err(OptionError::Invalid));
        // Failed writes leave the previous value.
        assert!(opts.get_flag("idle"));
    }

    #[test]
    fn test_float_validation() {
        let mut opts = OptionStore::new();
        assert_eq!(opts.set("volume", "55.5"), Ok(()));
        assert_eq!(opts.get_f64("volume"), Some(55.5));
        assert_eq!(opts.set("volume", "loud"), Err(OptionError::Invalid));
        assert_eq!(opts.set("volume", "131"), Err(OptionError::OutOfRange));
        assert_eq!(opts.set("volume", "-1"), Err(OptionError::OutOfRange));
        assert_eq!(opts.set("speed", "0"), Err(OptionError::OutOfRange));
    }

    #[test]
    fn test_unknown_option() {
        let mut opts = OptionStore::new();
        assert_eq!(opts.set("brightness", "1"), Err(OptionError::Unknown));
    }

    #[test]
    fn test_text_accepts_anything() {
        let mut opts = OptionStore::new();
        assert_eq!(opts.set("title", ""), Ok(()));
        assert_eq!(opts.set("title", "number 2"), Ok(()));
        assert_eq!(opts.get("title"), Some("number 2"));
    }
}
