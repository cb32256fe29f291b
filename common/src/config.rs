use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use hocon::{Hocon, HoconLoader};

use crate::FsExt;

#[derive(Debug)]
pub struct ConfigLoader {
    hocon: Hocon,
    env: HashMap<String, String>,
    scope: String,
}

impl ConfigLoader {
    pub fn new(path: impl AsRef<Path>, scope: String) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The config file {:?} was not found", path);
        }

        let env = std::env::vars().collect::<HashMap<_, _>>();

        let hocon = HoconLoader::new()
            .load_file(path)
            .with_context(|| format!("Failed to find or load config file at: {:?}", path))?
            .hocon()?;

        Ok(Self { hocon, env, scope })
    }

    /// Builds a loader from an in-memory document. Environment variables are not consulted.
    pub fn from_str(contents: &str, scope: String) -> Result<Self> {
        let hocon = HoconLoader::new()
            .load_str(contents)
            .context("Failed to parse config")?
            .hocon()?;

        Ok(Self {
            hocon,
            env: HashMap::new(),
            scope,
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.env.get(name) {
            return Some(Value::String(value.clone()));
        }

        let scope = &self.hocon[self.scope.as_str()];
        if matches!(scope, Hocon::Hash(_)) {
            if let Some(value) = Self::map_hocon(scope, name) {
                return Some(value);
            }
        }

        Self::map_hocon(&self.hocon, name)
    }

    pub fn get_relative_path(&self, name: &str) -> Result<PathBuf> {
        let path = self
            .get(name)
            .and_then(|v| v.as_string())
            .ok_or_else(|| anyhow!("Config value {} is missing", name))?;

        path.relative_to_cwd()
    }

    pub fn get_optional_path(&self, name: &str) -> Result<Option<PathBuf>> {
        match self.get(name).and_then(|v| v.as_string()) {
            Some(path) if !path.is_empty() => Ok(Some(path.relative_to_cwd()?)),
            _ => Ok(None),
        }
    }

    pub fn load<T: Config>(&self) -> Result<T> {
        let res = T::load(self)?;
        Ok(res)
    }

    fn map_hocon(hocon: &Hocon, name: &str) -> Option<Value> {
        match &hocon[name] {
            Hocon::Real(f64) => Some(Value::Float(*f64)),
            Hocon::Integer(i64) => Some(Value::Integer(*i64)),
            Hocon::String(string) => Some(Value::String(string.clone())),
            Hocon::Boolean(bool) => Some(Value::Boolean(*bool)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(val) => Some(*val),
            Value::String(val) => Hocon::String(val.clone()).as_bool(),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::Integer(val) => usize::try_from(*val).ok(),
            Value::String(val) => val.parse::<usize>().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(val) => u64::try_from(*val).ok(),
            Value::String(val) => val.parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(val) => Some(*val),
            Value::Integer(val) => Some(*val as f64),
            Value::String(val) => val.parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(val) => Some(val.clone()),
            Value::Boolean(true) => Some("true".to_string()),
            Value::Boolean(false) => Some("false".to_string()),
            Value::Float(val) => Some(val.to_string()),
            Value::Integer(val) => Some(val.to_string()),
        }
    }
}

pub trait Config {
    fn load(config: &ConfigLoader) -> Result<Self>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const CONF: &str = r#"
        budget = 40
        prep_value = 0.0036
        repertoire {
            budget = 12
            include_placeholders = false
        }
    "#;

    #[test]
    fn test_scope_takes_precedence_over_root() {
        let config = ConfigLoader::from_str(CONF, "repertoire".to_string()).unwrap();

        assert_eq!(config.get("budget").and_then(|v| v.as_usize()), Some(12));
        assert_eq!(
            config.get("include_placeholders").and_then(|v| v.as_bool()),
            Some(false)
        );
    }

    #[test]
    fn test_falls_back_to_root() {
        let config = ConfigLoader::from_str(CONF, "repertoire".to_string()).unwrap();

        assert_approx_eq!(
            config.get("prep_value").and_then(|v| v.as_f64()).unwrap(),
            0.0036,
            1e-12
        );
    }

    #[test]
    fn test_missing_scope_reads_root() {
        let config = ConfigLoader::from_str(CONF, "tree".to_string()).unwrap();

        assert_eq!(config.get("budget").and_then(|v| v.as_usize()), Some(40));
        assert!(config.get("player_strength").is_none());
    }

    #[test]
    fn test_string_values_parse_as_numbers() {
        let value = Value::String("1.5".to_string());

        assert_eq!(value.as_f64(), Some(1.5));
        assert_eq!(Value::Integer(-1).as_usize(), None);
    }
}
