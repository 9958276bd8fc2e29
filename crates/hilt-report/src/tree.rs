//! Hierarchical view of the steps: module, then each extra field value in order.
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::step::TestStep;

/// One level of the hierarchy. Its result is the AND of every rated step below it.
#[derive(Debug, Clone)]
pub struct Node {
    result: bool,
    description: bool,
    steps: Vec<TestStep>,
    children: Vec<(String, Node)>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            result: true,
            description: false,
            steps: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl Node {
    pub fn result(&self) -> bool {
        self.result
    }

    /// Whether the first step stored at this node is descriptive.
    pub fn is_description(&self) -> bool {
        self.description
    }

    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> + Clone {
        self.children.iter().map(|(k, n)| (k.as_str(), n))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|(k, _)| k == name).map(|(_, n)| n)
    }

    fn child_mut(&mut self, name: &str) -> &mut Node {
        let pos = match self.children.iter().position(|(k, _)| k == name) {
            Some(pos) => pos,
            None => {
                self.children.push((name.to_string(), Node::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[pos].1
    }

    /// Own steps first, then each child in insertion order.
    fn collect<'a>(&'a self, out: &mut Vec<&'a TestStep>) {
        out.extend(self.steps.iter());
        for (_, child) in &self.children {
            child.collect(out);
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("result", &self.result)?;
        if self.description {
            map.serialize_entry("is_description", &true)?;
        }
        if !self.steps.is_empty() {
            map.serialize_entry("steps", &self.steps)?;
        }
        for (name, child) in &self.children {
            map.serialize_entry(name, child)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportTree {
    root: Node,
}

impl ReportTree {
    pub fn build<'a>(steps: impl IntoIterator<Item = &'a TestStep>) -> Self {
        let mut root = Node::default();
        for step in steps {
            let rated = step.result().unwrap_or(true);
            root.result &= rated;

            let mut node = root.child_mut(step.module());
            node.result &= rated;
            for field in step.fields() {
                if field.value().is_empty() {
                    break;
                }
                node = node.child_mut(field.value());
                node.result &= rated;
            }

            node.steps.push(step.clone());
            if node.steps[0].is_description() {
                node.description = true;
            }
        }
        Self { root }
    }

    /// AND over every rated step.
    pub fn result(&self) -> bool {
        self.root.result
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &Node)> + Clone {
        self.root.children()
    }

    /// Node at `path` (module first), if any step reached it.
    pub fn node(&self, path: &[&str]) -> Option<&Node> {
        path.iter().try_fold(&self.root, |node, name| node.child(name))
    }

    /// Steps grouped by hierarchy, depth first.
    pub fn ordered_steps(&self) -> Vec<&TestStep> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for ReportTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, module: &str, fields: &[(&str, &str)], result: Option<bool>) -> TestStep {
        let mut s = TestStep::new(name, module);
        for (k, v) in fields {
            s.set_field(*k, *v);
        }
        s.set_result(result, "");
        s
    }

    #[test]
    fn results_propagate_up_the_path() {
        let steps = vec![
            step("a", "RADIO", &[("component", "rx"), ("section", "gain")], Some(true)),
            step("b", "RADIO", &[("component", "tx"), ("section", "power")], Some(false)),
            step("c", "MODEM", &[("component", "at")], Some(true)),
            step("d", "MODEM", &[("component", "at")], None),
        ];
        let tree = ReportTree::build(&steps);

        assert!(!tree.result());
        assert!(!tree.node(&["RADIO"]).unwrap().result());
        assert!(tree.node(&["RADIO", "rx"]).unwrap().result());
        assert!(!tree.node(&["RADIO", "tx", "power"]).unwrap().result());
        assert!(tree.node(&["MODEM"]).unwrap().result());
        assert_eq!(tree.node(&["MODEM", "at"]).unwrap().steps().len(), 2);
        assert!(tree.node(&["GPS"]).is_none());
    }

    #[test]
    fn empty_field_stops_descent() {
        let steps = vec![step("a", "RADIO", &[("component", ""), ("section", "x")], Some(true))];
        let tree = ReportTree::build(&steps);

        assert_eq!(tree.node(&["RADIO"]).unwrap().steps().len(), 1);
        assert!(tree.node(&["RADIO", "x"]).is_none());
    }

    #[test]
    fn ordered_steps_group_by_module() {
        let steps = vec![
            step("a", "RADIO", &[], Some(true)),
            step("b", "MODEM", &[], Some(true)),
            step("c", "RADIO", &[], Some(true)),
        ];
        let tree = ReportTree::build(&steps);
        let names: Vec<_> = tree.ordered_steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, ["a", "c", "b"]);
    }

    #[test]
    fn description_nodes_are_flagged_in_json() {
        let steps = vec![
            TestStep::description("intro", "RADIO", "About the radio").with_field("component", "doc"),
            step("a", "RADIO", &[("component", "doc")], Some(true)),
        ];
        let tree = ReportTree::build(&steps);
        let json: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();

        assert_eq!(json["result"], true);
        assert_eq!(json["RADIO"]["doc"]["is_description"], true);
        assert_eq!(json["RADIO"]["doc"]["steps"].as_array().unwrap().len(), 2);
    }
}
