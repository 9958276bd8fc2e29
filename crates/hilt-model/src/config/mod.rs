use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ModelError;

/// Declaration of a single hardware module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Modules that must be locked before this one.
    ///
    /// A missing or `null` entry is normalized to an empty list.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub depends: Vec<String>,
}

impl ModuleSpec {
    pub fn new<I, S>(depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            depends: depends.into_iter().map(Into::into).collect(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Static module graph: module name -> declared dependencies.
///
/// The graph must be acyclic. Nothing checks this on load; [`ModuleConfig::validate`]
/// is available for callers that want to reject bad graphs up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleConfig(BTreeMap<String, ModuleSpec>);

impl ModuleConfig {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert, mostly for tests and small rigs.
    pub fn with_module<I, S>(mut self, name: impl Into<String>, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.insert(name.into(), ModuleSpec::new(depends));
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSpec> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModuleSpec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject graphs the recursive locker cannot handle.
    ///
    /// Two shapes deadlock at lock time: a cycle, and a module that reaches the same dependency
    /// through more than one path (the shared dependency gets acquired twice).
    /// Dependencies naming unknown modules are allowed; they are skipped with a warning at lock time.
    pub fn validate(&self) -> Result<(), ModelError> {
        for root in self.0.keys() {
            let mut path = Vec::new();
            let mut seen = HashSet::new();
            self.walk(root, root, &mut path, &mut seen)?;
        }
        Ok(())
    }

    fn walk<'a>(
        &'a self,
        root: &str,
        name: &'a str,
        path: &mut Vec<&'a str>,
        seen: &mut HashSet<&'a str>,
    ) -> Result<(), ModelError> {
        if path.contains(&name) {
            let mut cycle = path.clone();
            cycle.push(name);
            return Err(ModelError::Cycle(cycle.join(" -> ")));
        }
        if !seen.insert(name) {
            return Err(ModelError::SharedDependency {
                module: root.to_string(),
                shared: name.to_string(),
            });
        }

        path.push(name);
        if let Some(spec) = self.0.get(name) {
            for dep in &spec.depends {
                self.walk(root, dep, path, seen)?;
            }
        }
        path.pop();
        Ok(())
    }
}

impl FromIterator<(String, ModuleSpec)> for ModuleConfig {
    fn from_iter<T: IntoIterator<Item = (String, ModuleSpec)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
