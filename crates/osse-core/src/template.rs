//! Stage templates and the overlays derived per cycle.
//!
//! A template is loaded once and never mutated. Rendering clones it and
//! applies an [`Overlay`], a list of `(key path, value)` pairs. Key paths
//! are dot-separated mapping keys (keys may contain spaces); a `[*]`
//! suffix applies the rest of the path to every element of a list that
//! the template already has. Absent lists are left alone.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::{OsseError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Each,
}

/// Parsed `a.b[*].c` style key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

impl KeyPath {
    pub fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        for part in text.split('.') {
            match part.strip_suffix("[*]") {
                Some(key) => {
                    segments.push(Segment::Key(key.to_string()));
                    segments.push(Segment::Each);
                }
                None => segments.push(Segment::Key(part.to_string())),
            }
        }
        Self { segments }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                Segment::Each => f.write_str("[*]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Values to place into a template, in application order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    entries: Vec<(KeyPath, Value)>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.entries.push((KeyPath::parse(path), value.into()));
        self
    }

    /// Set `path` to the string form of `value`.
    pub fn set_display(self, path: &str, value: impl fmt::Display) -> Self {
        self.set(path, value.to_string())
    }

    pub fn set_path(self, path: &str, value: &Path) -> Self {
        self.set(path, value.to_string_lossy().into_owned())
    }

    /// Value recorded for `path`, if any (last one wins).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let wanted = KeyPath::parse(path);
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| *key == wanted)
            .map(|(_, value)| value)
    }
}

/// An immutable stage template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: PathBuf,
    value: Value,
}

impl Template {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| OsseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &text)
    }

    pub fn from_yaml(source: impl Into<PathBuf>, text: &str) -> Result<Self> {
        Ok(Self {
            source: source.into(),
            value: serde_yaml::from_str(text)?,
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// A copy of the template with `overlay` applied.
    pub fn render(&self, overlay: &Overlay) -> Result<Value> {
        let mut doc = self.value.clone();
        for (path, value) in &overlay.entries {
            apply(&mut doc, &path.segments, value).map_err(|key| OsseError::TemplateShape {
                path: self.source.clone(),
                key: format!("{key} (setting {path})"),
            })?;
        }
        Ok(doc)
    }
}

fn apply(node: &mut Value, segments: &[Segment], value: &Value) -> std::result::Result<(), String> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value.clone();
        return Ok(());
    };
    match head {
        Segment::Key(key) => {
            if node.is_null() {
                *node = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(map) = node else {
                return Err(key.clone());
            };
            let k = Value::String(key.clone());
            if matches!(rest.first(), Some(Segment::Each)) && !map.contains_key(&k) {
                return Ok(());
            }
            let child = map.entry(k).or_insert(Value::Null);
            apply(child, rest, value)
        }
        Segment::Each => match node {
            Value::Sequence(items) => {
                for item in items.iter_mut() {
                    apply(item, rest, value)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            _ => Err("[*]".to_string()),
        },
    }
}

/// Serialize `value` as YAML to `path`, creating parent directories.
pub fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_yaml::to_string(value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| OsseError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| OsseError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBS_TEMPLATE: &str = r#"
Assimilation Window:
  Begin: "2010-01-01T00:00:00Z"
  End: "2010-01-01T06:00:00Z"
Observations:
  ObsTypes:
    - ObsType: Lorenz 95
      ObsData:
        ObsDataOut:
          filename: old.obt
    - ObsType: Lorenz 95
      ObsData:
        ObsDataOut:
          filename: old.obt
"#;

    fn lookup<'a>(value: &'a Value, path: &[&str]) -> &'a Value {
        path.iter().fold(value, |v, k| &v[*k])
    }

    #[test]
    fn test_key_path_round_trip() {
        let path = KeyPath::parse("Observations.ObsTypes[*].ObsData.ObsDataOut.filename");
        assert_eq!(path.to_string(), "Observations.ObsTypes[*].ObsData.ObsDataOut.filename");
    }

    #[test]
    fn test_render_sets_nested_and_list_values() {
        let template = Template::from_yaml("makeobs.yaml", OBS_TEMPLATE).unwrap();
        let overlay = Overlay::new()
            .set("Assimilation Window.Begin", "2020-01-01T09:00:00Z")
            .set("Observations.ObsTypes[*].ObsData.ObsDataOut.filename", "new.obt")
            .set("Initial Condition.date", "2020-01-01T09:00:00Z");
        let doc = template.render(&overlay).unwrap();

        assert_eq!(
            lookup(&doc, &["Assimilation Window", "Begin"]).as_str(),
            Some("2020-01-01T09:00:00Z")
        );
        let types = doc["Observations"]["ObsTypes"].as_sequence().unwrap();
        assert_eq!(types.len(), 2);
        for t in types {
            assert_eq!(t["ObsData"]["ObsDataOut"]["filename"].as_str(), Some("new.obt"));
        }
        assert_eq!(
            lookup(&doc, &["Initial Condition", "date"]).as_str(),
            Some("2020-01-01T09:00:00Z")
        );
    }

    #[test]
    fn test_render_leaves_template_untouched() {
        let template = Template::from_yaml("makeobs.yaml", OBS_TEMPLATE).unwrap();
        let before = template.value().clone();
        template
            .render(&Overlay::new().set("Assimilation Window.End", "x"))
            .unwrap();
        assert_eq!(template.value(), &before);
    }

    #[test]
    fn test_absent_list_is_skipped() {
        let template = Template::from_yaml("makeobs.yaml", OBS_TEMPLATE).unwrap();
        let doc = template
            .render(&Overlay::new().set("Observations.ObsFilters[*].filename", "f.gom"))
            .unwrap();
        assert!(doc["Observations"].get("ObsFilters").is_none());
    }

    #[test]
    fn test_scalar_in_the_way_is_an_error() {
        let template = Template::from_yaml("t.yaml", "output: plain").unwrap();
        let err = template
            .render(&Overlay::new().set("output.datadir", "/x"))
            .unwrap_err();
        assert!(err.to_string().contains("t.yaml"));
    }

    #[test]
    fn test_missing_keys_are_created() {
        let doc = Template::from_yaml("t.yaml", "{}")
            .unwrap()
            .render(&Overlay::new().set("output.frequency", "PT6H"))
            .unwrap();
        assert_eq!(doc["output"]["frequency"].as_str(), Some("PT6H"));
    }

    #[test]
    fn test_overlay_get_returns_last_value() {
        let overlay = Overlay::new().set("a.b", "1").set("a.b", "2");
        assert_eq!(overlay.get("a.b").and_then(Value::as_str), Some("2"));
        assert!(overlay.get("a.c").is_none());
    }

    #[test]
    fn test_write_yaml_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yaml").join("truth.yaml");
        write_yaml(&path, &Value::from("forecast length: P1D")).unwrap();
        assert!(path.exists());
    }
}
