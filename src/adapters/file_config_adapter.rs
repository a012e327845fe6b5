//! INI file configuration adapter.

use crate::domain::error::BacklabError;
use crate::ports::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BacklabError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        // `;` separates signal entries inside values; it must not start an
        // inline comment.
        config.set_inline_comment_symbols(Some(&[]));
        config.load(path).map_err(|e| BacklabError::ConfigParse {
            file: path.display().to_string(),
            reason: e,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, BacklabError> {
        let mut config = Ini::new();
        config.set_inline_comment_symbols(Some(&[]));
        config
            .read(content.to_string())
            .map_err(|e| BacklabError::ConfigParse {
                file: "<inline>".to_string(),
                reason: e,
            })?;
        Ok(Self { config })
    }

    fn invalid(section: &str, key: &str, value: &str, expected: &str) -> BacklabError {
        BacklabError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("`{value}` is not {expected}"),
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Result<Option<String>, BacklabError> {
        Ok(self.config.get(section, key))
    }

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, BacklabError> {
        match self.config.get(section, key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Self::invalid(section, key, &value, "an integer")),
        }
    }

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, BacklabError> {
        match self.config.get(section, key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Self::invalid(section, key, &value, "a number")),
        }
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, BacklabError> {
        match self.config.get(section, key) {
            None => Ok(None),
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(Self::invalid(section, key, &value, "a boolean")),
            },
        }
    }
}
