//! Configuration access port trait.

use crate::domain::error::MeanrevError;

/// Section/key lookup over an INI-style configuration source.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Like `get_string`, but a missing or blank value is an error.
    fn require_string(&self, section: &str, key: &str) -> Result<String, MeanrevError> {
        self.get_string(section, key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| MeanrevError::ConfigMissing {
                section: section.into(),
                key: key.into(),
            })
    }
}
