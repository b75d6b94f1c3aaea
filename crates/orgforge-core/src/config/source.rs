use std::path::Path;

use anyhow::Context;
use serde_yaml::{Mapping, Value};

use crate::errors::ConfigurationError;

/// Where configuration comes from. Keys are top-level option names.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<Value>;
    fn keys(&self) -> Vec<String>;
}

/// A YAML document, from a file or a string.
#[derive(Debug, Clone, Default)]
pub struct YamlSource {
    root: Mapping,
}

impl YamlSource {
    pub fn from_str(yaml: &str) -> Result<Self, ConfigurationError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value =
            serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::Syntax(e.to_string()))?;
        match value {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            other => Err(ConfigurationError::Syntax(format!(
                "top level must be a mapping, got {}",
                kind_name(&other)
            ))),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

impl ConfigSource for YamlSource {
    fn get(&self, key: &str) -> Option<Value> {
        self.root.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.root
            .keys()
            .filter_map(|k| k.as_str().map(String::from))
            .collect()
    }
}

/// `key=value` pairs, e.g. from `--set` flags or a flat env-style file.
///
/// Dotted keys nest (`generation.concurrency=8`). Values are read as YAML, so
/// `4-6` stays a string, `[4, 6]` becomes a sequence and `0.2` a number.
#[derive(Debug, Clone, Default)]
pub struct KeyValueSource {
    root: Mapping,
}

impl KeyValueSource {
    pub fn parse<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigurationError> {
        let mut root = Mapping::new();
        for raw in pairs {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| ConfigurationError::Syntax(format!("expected key=value, got `{line}`")))?;
            let key = key.trim();
            if key.is_empty() || key.split('.').any(str::is_empty) {
                return Err(ConfigurationError::Syntax(format!("bad key in `{line}`")));
            }
            insert_dotted(&mut root, key, parse_scalar(value.trim()));
        }
        Ok(Self { root })
    }

    /// One pair per line.
    pub fn from_lines(text: &str) -> Result<Self, ConfigurationError> {
        Self::parse(text.lines())
    }
}

impl ConfigSource for KeyValueSource {
    fn get(&self, key: &str) -> Option<Value> {
        self.root.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.root
            .keys()
            .filter_map(|k| k.as_str().map(String::from))
            .collect()
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match serde_yaml::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(_) => Value::String(raw.to_string()),
    }
}

fn insert_dotted(root: &mut Mapping, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            root.insert(Value::String(key.into()), value);
        }
        Some((head, rest)) => {
            let slot = root
                .entry(Value::String(head.into()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !slot.is_mapping() {
                *slot = Value::Mapping(Mapping::new());
            }
            if let Value::Mapping(inner) = slot {
                insert_dotted(inner, rest, value);
            }
        }
    }
}

/// Deep-merge `overlay` into `base`; mappings merge, everything else replaces.
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(b), Value::Mapping(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(existing) => merge_value(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

pub(crate) fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_source_keys_and_values() {
        let src = YamlSource::from_str("team_count: 3\nbug_rate: 0.2\n").unwrap();
        assert_eq!(src.keys(), vec!["team_count", "bug_rate"]);
        assert_eq!(src.get("team_count"), Some(Value::from(3)));
        assert_eq!(src.get("missing"), None);
    }

    #[test]
    fn yaml_source_rejects_non_mapping() {
        assert!(matches!(
            YamlSource::from_str("- 1\n- 2\n"),
            Err(ConfigurationError::Syntax(_))
        ));
        assert!(YamlSource::from_str("a: [").is_err());
        assert!(YamlSource::from_str("").unwrap().keys().is_empty());
    }

    #[test]
    fn yaml_source_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.yaml");
        std::fs::write(&path, "team_count: 2\n").unwrap();
        let src = YamlSource::load(&path).unwrap();
        assert_eq!(src.get("team_count"), Some(Value::from(2)));
        assert!(YamlSource::load(&dir.path().join("nope.yaml")).is_err());
    }

    #[test]
    fn key_value_scalars() {
        let src = KeyValueSource::parse([
            "team_count=3",
            "bug_rate = 0.25",
            "team_size_range=4-6",
            "story_range=[2, 4]",
            "company_name=Globex Corp",
        ])
        .unwrap();
        assert_eq!(src.get("team_count"), Some(Value::from(3)));
        assert_eq!(src.get("bug_rate"), Some(Value::from(0.25)));
        assert_eq!(src.get("team_size_range"), Some(Value::from("4-6")));
        assert!(src.get("story_range").unwrap().is_sequence());
        assert_eq!(src.get("company_name"), Some(Value::from("Globex Corp")));
    }

    #[test]
    fn key_value_dotted_keys_nest() {
        let src = KeyValueSource::from_lines(
            "# overrides\ngeneration.concurrency=8\ngeneration.temperature=0.5\n",
        )
        .unwrap();
        let generation = src.get("generation").unwrap();
        assert_eq!(generation.get("concurrency"), Some(&Value::from(8)));
        assert_eq!(generation.get("temperature"), Some(&Value::from(0.5)));
        assert_eq!(src.keys(), vec!["generation"]);
    }

    #[test]
    fn key_value_rejects_garbage() {
        assert!(KeyValueSource::parse(["no_equals_sign"]).is_err());
        assert!(KeyValueSource::parse(["=3"]).is_err());
        assert!(KeyValueSource::parse(["a..b=3"]).is_err());
    }

    #[test]
    fn merge_is_deep() {
        let mut base: Value =
            serde_yaml::from_str("generation: { concurrency: 4, temperature: 0.8 }\nseed: 1").unwrap();
        let overlay: Value = serde_yaml::from_str("generation: { concurrency: 8 }\nseed: 2").unwrap();
        merge_value(&mut base, overlay);
        assert_eq!(base["generation"]["concurrency"], Value::from(8));
        assert_eq!(base["generation"]["temperature"], Value::from(0.8));
        assert_eq!(base["seed"], Value::from(2));
    }
}
