//! Phase groups: the recursive setup/main/teardown tree
//!
//! A group owns its children, so a group can never contain itself. The runner
//! walks this tree recursively; nothing about a group is persisted between
//! invocations.

use serde::{Deserialize, Serialize};

use crate::domain::phase::PhaseDescriptor;
use crate::error::{ExecutorError, Result};

/// One entry of a group stage: a leaf phase or a nested group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseNode {
    Phase(PhaseDescriptor),
    Group(PhaseGroup),
}

impl From<PhaseDescriptor> for PhaseNode {
    fn from(phase: PhaseDescriptor) -> Self {
        PhaseNode::Phase(phase)
    }
}

impl From<PhaseGroup> for PhaseNode {
    fn from(group: PhaseGroup) -> Self {
        PhaseNode::Group(group)
    }
}

/// Stage of a group a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Main,
    Teardown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Main => "main",
            Stage::Teardown => "teardown",
        }
    }
}

/// Named collection of phases split into setup, main and teardown stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseGroup {
    pub name: Option<String>,
    #[serde(with = "nodes")]
    pub setup: Vec<PhaseNode>,
    #[serde(with = "nodes")]
    pub main: Vec<PhaseNode>,
    #[serde(with = "nodes")]
    pub teardown: Vec<PhaseNode>,
}

/// Stage entries as single-key maps (`- phase: {...}`, `- group: {...}`)
/// instead of YAML tags.
mod nodes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::PhaseNode;

    #[derive(Deserialize)]
    struct Node(#[serde(with = "serde_yaml::with::singleton_map")] PhaseNode);

    #[derive(Serialize)]
    struct NodeRef<'a>(#[serde(with = "serde_yaml::with::singleton_map")] &'a PhaseNode);

    pub fn serialize<S>(nodes: &[PhaseNode], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(nodes.iter().map(NodeRef))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<PhaseNode>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nodes = Vec::<Node>::deserialize(deserializer)?;
        Ok(nodes.into_iter().map(|Node(node)| node).collect())
    }
}

impl PhaseGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group with only main entries
    pub fn from_main<I, N>(main: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PhaseNode>,
    {
        Self::new().with_main(main)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_setup<I, N>(mut self, setup: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PhaseNode>,
    {
        self.setup.extend(setup.into_iter().map(Into::into));
        self
    }

    pub fn with_main<I, N>(mut self, main: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PhaseNode>,
    {
        self.main.extend(main.into_iter().map(Into::into));
        self
    }

    pub fn with_teardown<I, N>(mut self, teardown: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<PhaseNode>,
    {
        self.teardown.extend(teardown.into_iter().map(Into::into));
        self
    }

    /// Entries of one stage
    pub fn stage(&self, stage: Stage) -> &[PhaseNode] {
        match stage {
            Stage::Setup => &self.setup,
            Stage::Main => &self.main,
            Stage::Teardown => &self.teardown,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.main.is_empty() && self.teardown.is_empty()
    }

    /// Number of leaf phases in the whole tree
    pub fn phase_count(&self) -> usize {
        self.iter_phases().count()
    }

    /// Leaf phases depth first, in declared order (setup, main, teardown)
    pub fn iter_phases(&self) -> impl Iterator<Item = &PhaseDescriptor> + '_ {
        let mut out = Vec::new();
        collect_phases(self, &mut out);
        out.into_iter()
    }

    /// One-time validation pass over the tree
    pub fn validate(&self) -> Result<()> {
        for phase in self.iter_phases() {
            if phase.name.trim().is_empty() {
                return Err(ExecutorError::InvalidPlan(format!(
                    "phase with blank name in group {}",
                    self.name.as_deref().unwrap_or("<unnamed>")
                )));
            }
        }
        Ok(())
    }
}

fn collect_phases<'a>(group: &'a PhaseGroup, out: &mut Vec<&'a PhaseDescriptor>) {
    for node in group.setup.iter().chain(&group.main).chain(&group.teardown) {
        match node {
            PhaseNode::Phase(phase) => out.push(phase),
            PhaseNode::Group(nested) => collect_phases(nested, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(name: &str) -> PhaseDescriptor {
        PhaseDescriptor::new(name)
    }

    #[test]
    fn test_builder_and_stages() {
        let group = PhaseGroup::new()
            .with_name("outer")
            .with_setup([phase("a")])
            .with_main([phase("b"), phase("c")])
            .with_teardown([phase("d")]);

        assert_eq!(group.name.as_deref(), Some("outer"));
        assert_eq!(group.stage(Stage::Setup).len(), 1);
        assert_eq!(group.stage(Stage::Main).len(), 2);
        assert_eq!(group.stage(Stage::Teardown).len(), 1);
        assert!(!group.is_empty());
    }

    #[test]
    fn test_iter_phases_depth_first() {
        let inner = PhaseGroup::new()
            .with_setup([phase("inner_setup")])
            .with_main([phase("inner_main")])
            .with_teardown([phase("inner_teardown")]);
        let group = PhaseGroup::new()
            .with_setup([phase("a")])
            .with_main(vec![PhaseNode::from(phase("b")), PhaseNode::from(inner)])
            .with_teardown([phase("d")]);

        let names: Vec<&str> = group.iter_phases().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["a", "b", "inner_setup", "inner_main", "inner_teardown", "d"]
        );
        assert_eq!(group.phase_count(), 6);
    }

    #[test]
    fn test_validate_rejects_blank_names() {
        let group = PhaseGroup::from_main([phase("ok"), phase("  ")]).with_name("root");
        let err = group.validate().unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidPlan(_)));

        assert!(PhaseGroup::from_main([phase("ok")]).validate().is_ok());
    }

    #[test]
    fn test_yaml_shape() {
        let yaml = r#"
name: root
setup:
  - phase: { name: connect, plugs: [dut_link] }
main:
  - phase: { name: measure }
  - group:
      name: nested
      main:
        - phase: { name: inner }
"#;
        let group: PhaseGroup = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(group.setup.len(), 1);
        assert_eq!(group.main.len(), 2);
        assert!(group.teardown.is_empty());
        assert!(matches!(&group.main[1], PhaseNode::Group(g) if g.name.as_deref() == Some("nested")));
    }

    #[test]
    fn test_yaml_written_as_single_key_maps() {
        let inner = PhaseGroup::from_main([phase("inner")]).with_name("nested");
        let group = PhaseGroup::new()
            .with_setup([phase("connect").with_plug("dut_link")])
            .with_main(vec![PhaseNode::from(phase("measure")), PhaseNode::from(inner)]);

        let yaml = serde_yaml::to_string(&group).unwrap();
        assert!(!yaml.contains('!'));
        assert!(yaml.contains("- phase:"));
        assert!(yaml.contains("- group:"));

        let parsed: PhaseGroup = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, group);
    }

    #[test]
    fn test_json_uses_the_same_shape() {
        let group = PhaseGroup::from_main([phase("measure")]);
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["main"][0]["phase"]["name"], "measure");
    }
}
