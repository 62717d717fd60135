//! INI-backed `ConfigPort` implementation.

use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::MicrotraderError;
use crate::ports::config_port::ConfigPort;

/// Reads strategy settings from an INI file. Missing or malformed keys fall
/// back to the caller-supplied default, so a sparse file stays usable.
pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MicrotraderError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|reason| MicrotraderError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, MicrotraderError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| MicrotraderError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini.getint(section, key).ok().flatten().unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.ini
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .getboolcoerce(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }
}
