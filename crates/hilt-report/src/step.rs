use std::time::{Duration, Instant};

use hilt_model::{KeyValue, StepRecord};
use serde::{Serialize, Serializer, ser::SerializeMap};
use tracing::info;

/// One check of a test, with its place in the report hierarchy.
///
/// Extra fields (`component`, `section`, ...) keep their insertion order: it is the order
/// of the hierarchy levels below the module.
#[derive(Debug, Clone)]
pub struct TestStep {
    name: String,
    module: String,
    index: Option<usize>,
    fields: Vec<KeyValue>,
    result: Option<bool>,
    comments: String,
    started: Instant,
    duration: Duration,
    description: bool,
}

impl TestStep {
    /// Start a step. Logs `[module] start name`.
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        let step = Self::quiet(name.into(), module.into());
        info!("{} start {}", step.header(), step.name);
        step
    }

    /// A descriptive step: carries text for the report and never counts toward a result.
    pub fn description(
        name: impl Into<String>,
        module: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut step = Self::quiet(name.into(), module.into());
        step.comments = text.into();
        step.description = true;
        step
    }

    fn quiet(name: String, module: String) -> Self {
        Self {
            name,
            module,
            index: None,
            fields: Vec::new(),
            result: None,
            comments: String::new(),
            started: Instant::now(),
            duration: Duration::ZERO,
            description: false,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Set an extra field; an existing key keeps its position.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(key, value);
        self
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let kv = KeyValue::new(key, value);
        match self.fields.iter_mut().find(|f| f.key() == kv.key()) {
            Some(slot) => *slot = kv,
            None => self.fields.push(kv),
        }
    }

    /// Close the step. Logs `[module] PASSED` or `[module] FAILED`.
    pub fn set_result(&mut self, result: Option<bool>, comments: impl Into<String>) {
        self.result = result;
        self.comments = comments.into();
        self.duration = self.started.elapsed();
        match result {
            Some(true) => info!("{} PASSED", self.header()),
            Some(false) => info!("{} FAILED", self.header()),
            None => info!("{} done", self.header()),
        }
    }

    pub fn pass(&mut self, comments: impl Into<String>) {
        self.set_result(Some(true), comments);
    }

    pub fn fail(&mut self, comments: impl Into<String>) {
        self.set_result(Some(false), comments);
    }

    fn header(&self) -> String {
        let short: String = self.module.chars().take(8).collect();
        format!("[{short}]")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = Some(index);
    }

    pub fn fields(&self) -> &[KeyValue] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.key() == key).map(KeyValue::value)
    }

    pub fn result(&self) -> Option<bool> {
        self.result
    }

    pub fn comments(&self) -> &str {
        &self.comments
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_description(&self) -> bool {
        self.description
    }

    /// Report columns in order: module, index, extra fields, test, duration, result, Comments.
    pub fn columns(&self) -> Vec<(String, String)> {
        let mut cols = Vec::with_capacity(self.fields.len() + 7);
        cols.push(("module".to_string(), self.module.clone()));
        cols.push((
            "index".to_string(),
            self.index.map_or_else(|| "-".to_string(), |i| i.to_string()),
        ));
        for f in &self.fields {
            cols.push((f.key().to_string(), f.value().to_string()));
        }
        cols.push(("test".to_string(), self.name.clone()));
        cols.push(("duration".to_string(), format!("{:.3}", self.duration.as_secs_f64())));
        cols.push((
            "result".to_string(),
            self.result.map(|r| r.to_string()).unwrap_or_default(),
        ));
        cols.push(("Comments".to_string(), self.comments.clone()));
        if self.description {
            cols.push(("is_description".to_string(), "true".to_string()));
        }
        cols
    }

    pub fn to_record(&self) -> StepRecord {
        StepRecord::new(&self.name, &self.module, self.result)
            .with_comment(&self.comments)
            .with_duration(self.duration)
    }
}

impl From<StepRecord> for TestStep {
    fn from(rec: StepRecord) -> Self {
        let mut step = Self::quiet(rec.test, rec.module);
        step.result = rec.result;
        step.comments = rec.comment;
        step.duration = rec.duration;
        step
    }
}

impl Serialize for TestStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("module", &self.module)?;
        match self.index {
            Some(i) => map.serialize_entry("index", &i)?,
            None => map.serialize_entry("index", "-")?,
        }
        for f in &self.fields {
            map.serialize_entry(f.key(), f.value())?;
        }
        map.serialize_entry("test", &self.name)?;
        map.serialize_entry("duration", &self.duration.as_secs_f64())?;
        map.serialize_entry("result", &self.result)?;
        map.serialize_entry("Comments", &self.comments)?;
        if self.description {
            map.serialize_entry("is_description", &true)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_insertion_order() {
        let step = TestStep::new("ping", "MODEM")
            .with_field("component", "lte")
            .with_field("section", "attach")
            .with_field("component", "nr");

        let keys: Vec<_> = step.columns().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["module", "index", "component", "section", "test", "duration", "result", "Comments"]
        );
        assert_eq!(step.field("component"), Some("nr"));
    }

    #[test]
    fn description_is_unrated() {
        let step = TestStep::description("intro", "RADIO", "Checks the RF front end.");
        assert!(step.is_description());
        assert_eq!(step.result(), None);
        assert_eq!(step.comments(), "Checks the RF front end.");
    }

    #[test]
    fn json_mirrors_columns() {
        let mut step = TestStep::new("ping", "MODEM").with_index(3);
        step.fail("no answer");

        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["module"], "MODEM");
        assert_eq!(v["index"], 3);
        assert_eq!(v["result"], false);
        assert_eq!(v["Comments"], "no answer");
        assert!(v.get("is_description").is_none());
    }
}
