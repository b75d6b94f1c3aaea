use serde_yaml::{Mapping, Value};

use crate::config::schema::{RunConfig, REQUIRED_KEYS};
use crate::config::source::{kind_name, merge_value, ConfigSource, YamlSource};
use crate::errors::ConfigurationError;

const RANGE_KEYS: &[&str] = &[
    "team_size_range",
    "story_range",
    "task_range",
    "subtask_range",
    "generation.thread_length_range",
    "generation.transcript_turns_range",
];

/// Parse and validate a config from a YAML string.
pub fn parse_config(yaml: &str) -> Result<RunConfig, ConfigurationError> {
    load_config(&[&YamlSource::from_str(yaml)?])
}

/// Load a config from one or more sources; later sources override earlier ones.
pub fn load_config(sources: &[&dyn ConfigSource]) -> Result<RunConfig, ConfigurationError> {
    // Step 1: Merge sources into one raw mapping
    let mut raw = Value::Mapping(Mapping::new());
    for source in sources {
        let mut layer = Mapping::new();
        for key in source.keys() {
            if let Some(v) = source.get(&key) {
                layer.insert(Value::String(key), v);
            }
        }
        merge_value(&mut raw, Value::Mapping(layer));
    }

    // Step 2: Required options present
    for key in REQUIRED_KEYS {
        match raw.get(*key) {
            None | Some(Value::Null) => return Err(ConfigurationError::Missing((*key).into())),
            Some(_) => {}
        }
    }

    // Step 3: Normalize short forms
    for key in RANGE_KEYS {
        if let Some(slot) = lookup_mut(&mut raw, key) {
            *slot = normalize_range(key, slot)?;
        }
    }
    if let Some(slot) = raw.get_mut("scenario_mix") {
        *slot = normalize_mix(slot)?;
    }

    // Step 4: Expand variables
    expand_variables(&mut raw);

    // Step 5: Deserialize into typed config
    let config: RunConfig =
        serde_yaml::from_value(raw).map_err(|e| ConfigurationError::Syntax(e.to_string()))?;

    // Step 6: Validate constraints
    config.validate()?;

    Ok(config)
}

fn lookup_mut<'a>(raw: &'a mut Value, dotted: &str) -> Option<&'a mut Value> {
    let mut cur = raw;
    for part in dotted.split('.') {
        cur = cur.get_mut(part)?;
    }
    Some(cur)
}

/// Normalize a range into `{ min, max }`.
///
/// Accepts `"4-6"`, `[4, 6]`, `{ min: 4, max: 6 }` and a bare `5`.
fn normalize_range(key: &str, value: &Value) -> Result<Value, ConfigurationError> {
    let bad = |why: &str| ConfigurationError::invalid(key, why.to_string());
    let (min, max) = match value {
        Value::Number(_) => {
            let n = as_bound(value).ok_or_else(|| bad("must be a non-negative integer"))?;
            (n, n)
        }
        Value::String(s) => {
            let (a, b) = s
                .split_once('-')
                .ok_or_else(|| bad("string ranges look like \"4-6\""))?;
            let a = a.trim().parse::<u64>().map_err(|_| bad("bad lower bound"))?;
            let b = b.trim().parse::<u64>().map_err(|_| bad("bad upper bound"))?;
            (a, b)
        }
        Value::Sequence(seq) => {
            if seq.len() != 2 {
                return Err(bad("sequence ranges need exactly two numbers"));
            }
            let a = as_bound(&seq[0]).ok_or_else(|| bad("bad lower bound"))?;
            let b = as_bound(&seq[1]).ok_or_else(|| bad("bad upper bound"))?;
            (a, b)
        }
        Value::Mapping(_) => return Ok(value.clone()),
        other => {
            return Err(bad(&format!(
                "expected a range, got {}",
                kind_name(other)
            )))
        }
    };
    let mut out = Mapping::new();
    out.insert(Value::String("min".into()), Value::from(min));
    out.insert(Value::String("max".into()), Value::from(max));
    Ok(Value::Mapping(out))
}

fn as_bound(v: &Value) -> Option<u64> {
    v.as_u64()
}

/// Normalize `scenario_mix` into a sequence of `{ kind, count }`.
///
/// Short: `{ StandupMeeting: 2, IncidentEmail: 1 }` (declaration order kept)
/// Long:  `[{ kind: StandupMeeting, count: 2 }]`
fn normalize_mix(value: &Value) -> Result<Value, ConfigurationError> {
    match value {
        Value::Mapping(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| {
                    let mut out = Mapping::new();
                    out.insert(Value::String("kind".into()), k.clone());
                    out.insert(Value::String("count".into()), v.clone());
                    Value::Mapping(out)
                })
                .collect();
            Ok(Value::Sequence(entries))
        }
        Value::Sequence(_) => Ok(value.clone()),
        other => Err(ConfigurationError::invalid(
            "scenario_mix",
            format!("expected a mapping of kind to count, got {}", kind_name(other)),
        )),
    }
}

/// Expand `${{ env.VAR_NAME }}` patterns in string values.
fn expand_variables(value: &mut Value) {
    match value {
        Value::String(s) if s.contains("${{") => {
            let expanded = expand_env_vars(s);
            // A fully substituted value is re-read so `${{ env.SEED }}` can be a number.
            *value = match serde_yaml::from_str::<Value>(&expanded) {
                Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
                _ => Value::String(expanded),
            };
        }
        Value::Mapping(m) => m.iter_mut().for_each(|(_, v)| expand_variables(v)),
        Value::Sequence(seq) => seq.iter_mut().for_each(expand_variables),
        _ => {}
    }
}

fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${{") {
        result.push_str(&rest[..start]);
        let tail = &rest[start + 3..];
        let Some(end) = tail.find("}}") else {
            result.push_str(&rest[start..]);
            return result;
        };
        match tail[..end].trim().strip_prefix("env.") {
            Some(var) => result.push_str(&std::env::var(var.trim()).unwrap_or_default()),
            None => result.push_str(&rest[start..start + 3 + end + 2]),
        }
        rest = &tail[end + 2..];
    }
    result.push_str(rest);
    result
}

/// Render a config back to YAML with every default filled in.
pub fn to_yaml(config: &RunConfig) -> Result<String, ConfigurationError> {
    serde_yaml::to_string(config).map_err(|e| ConfigurationError::Syntax(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Range, ScenarioMix};
    use crate::config::source::KeyValueSource;
    use crate::types::{Role, ScenarioKind};

    const BASE: &str = r#"
team_count: 3
team_size_range: "4-6"
role_weights: { engineer: 5, senior_engineer: 2, manager: 1, qa: 1 }
epic_count: 2
story_range: [2, 4]
task_range: { min: 1, max: 2 }
bug_rate: 0.2
fixversion_count: 2
scenario_mix:
  StandupMeeting: 2
  incident_email: 1
"#;

    #[test]
    fn parse_short_forms() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.team_size_range, Range::new(4, 6));
        assert_eq!(cfg.story_range, Range::new(2, 4));
        assert_eq!(cfg.task_range, Range::new(1, 2));
        assert_eq!(cfg.role_weights[&Role::Engineer], 5.0);
        assert_eq!(
            cfg.scenario_mix,
            vec![
                ScenarioMix {
                    kind: ScenarioKind::StandupMeeting,
                    count: 2
                },
                ScenarioMix {
                    kind: ScenarioKind::IncidentEmail,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn missing_required_option() {
        let yaml = BASE.replace("epic_count: 2\n", "");
        assert_eq!(
            parse_config(&yaml),
            Err(ConfigurationError::Missing("epic_count".into()))
        );
    }

    #[test]
    fn unknown_option_rejected() {
        let yaml = format!("{BASE}team_colour: blue\n");
        assert!(matches!(
            parse_config(&yaml),
            Err(ConfigurationError::Syntax(_))
        ));
    }

    #[test]
    fn bad_range_string() {
        let yaml = BASE.replace("\"4-6\"", "\"four to six\"");
        assert!(matches!(
            parse_config(&yaml),
            Err(ConfigurationError::Invalid { key, .. }) if key == "team_size_range"
        ));
    }

    #[test]
    fn nested_range_normalized() {
        let yaml = format!("{BASE}generation:\n  thread_length_range: \"3-5\"\n  concurrency: 2\n");
        let cfg = parse_config(&yaml).unwrap();
        assert_eq!(cfg.generation.thread_length_range, Range::new(3, 5));
        assert_eq!(cfg.generation.concurrency, 2);
        assert_eq!(cfg.generation.call_timeout_sec, 60);
    }

    #[test]
    fn constraint_violation_surfaces() {
        let yaml = BASE.replace("bug_rate: 0.2", "bug_rate: 2.0");
        assert!(matches!(
            parse_config(&yaml),
            Err(ConfigurationError::Invalid { key, .. }) if key == "bug_rate"
        ));
    }

    #[test]
    fn env_expansion() {
        std::env::set_var("ORGFORGE_TEST_COMPANY", "Initech");
        std::env::set_var("ORGFORGE_TEST_SEED", "99");
        let yaml = format!(
            "{BASE}company_name: \"${{{{ env.ORGFORGE_TEST_COMPANY }}}} Labs\"\nseed: \"${{{{ env.ORGFORGE_TEST_SEED }}}}\"\n"
        );
        let cfg = parse_config(&yaml).unwrap();
        assert_eq!(cfg.company_name, "Initech Labs");
        assert_eq!(cfg.seed, 99);
    }

    #[test]
    fn unknown_expression_kept() {
        assert_eq!(expand_env_vars("a ${{ secrets.X }} b"), "a ${{ secrets.X }} b");
        assert_eq!(expand_env_vars("open ${{ env.X"), "open ${{ env.X");
    }

    #[test]
    fn later_sources_override() {
        let base = YamlSource::from_str(BASE).unwrap();
        let overrides =
            KeyValueSource::parse(["seed=7", "team_count=2", "generation.concurrency=1"]).unwrap();
        let cfg = load_config(&[&base, &overrides]).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.team_count, 2);
        assert_eq!(cfg.generation.concurrency, 1);
        assert_eq!(cfg.team_size_range, Range::new(4, 6));
    }

    #[test]
    fn round_trips_through_yaml() {
        let cfg = parse_config(BASE).unwrap();
        let rendered = to_yaml(&cfg).unwrap();
        assert_eq!(parse_config(&rendered).unwrap(), cfg);
    }
}
