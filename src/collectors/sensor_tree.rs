use serde::Deserialize;
use tracing::debug;

/// Reported for a matching node that carries no `Value`.
pub const MISSING_VALUE: &str = "N/A";

/// One node of the hardware monitor's `data.json` tree.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SensorNode {
    #[serde(rename = "Text", default)]
    pub label: String,
    #[serde(rename = "Value", default)]
    pub value: Option<String>,
    #[serde(rename = "Children", default)]
    pub children: Vec<SensorNode>,
}

impl SensorNode {
    fn child(&self, label: &str) -> Option<&SensorNode> {
        self.children.iter().find(|c| c.label == label)
    }
}

/// Builders for hand-made trees in tests.
#[cfg(test)]
impl SensorNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
            children: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_child(mut self, child: SensorNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Returns the value of the first node labelled `name`, searching children
/// before the node itself. With `required_parent`, only nodes whose immediate
/// parent carries that label are accepted. A matching node without a value
/// ends the search with [`MISSING_VALUE`].
pub fn find_value<'a>(
    tree: &'a SensorNode,
    name: &str,
    required_parent: Option<&str>,
) -> Option<&'a str> {
    find_value_under(tree, None, name, required_parent)
}

fn find_value_under<'a>(
    node: &'a SensorNode,
    parent_label: Option<&str>,
    name: &str,
    required_parent: Option<&str>,
) -> Option<&'a str> {
    for child in &node.children {
        if let Some(v) = find_value_under(child, Some(&node.label), name, required_parent) {
            return Some(v);
        }
    }

    if node.label != name {
        return None;
    }
    if let Some(required) = required_parent {
        if parent_label != Some(required) {
            return None;
        }
    }
    Some(node.value.as_deref().unwrap_or(MISSING_VALUE))
}

/// Depth-first search, node itself before its children.
pub fn find_node_by_label<'a>(tree: &'a SensorNode, label: &str) -> Option<&'a SensorNode> {
    if tree.label == label {
        return Some(tree);
    }
    tree.children
        .iter()
        .find_map(|child| find_node_by_label(child, label))
}

/// `<disk> -> Load -> Used Space`, the way the monitor nests storage load.
pub fn disk_used_space<'a>(tree: &'a SensorNode, disk: &str) -> Option<&'a str> {
    let Some(disk_node) = find_node_by_label(tree, disk) else {
        debug!(disk = %disk, "disk not found in sensor tree");
        return None;
    };
    let Some(load) = disk_node.child("Load") else {
        debug!(disk = %disk, "disk has no Load node");
        return None;
    };
    let Some(used) = load.child("Used Space") else {
        debug!(disk = %disk, "disk has no Used Space node");
        return None;
    };
    used.value.as_deref()
}
