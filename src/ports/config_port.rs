use crate::domain::error::BacklabError;

/// Configuration boundary. Keys are addressed as (section, key); a missing
/// key surfaces as `Ok(None)` so callers can layer defaults, while a present
/// but unparseable value is an error.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Result<Option<String>, BacklabError>;

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, BacklabError>;

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, BacklabError>;

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, BacklabError>;
}
