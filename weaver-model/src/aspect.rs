use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DeclarationId, DeclarationTree};

/// What produced an aspect instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstancePredecessor {
    /// The instance comes from an aspect source.
    Source { name: String },
    /// The instance has been created while evaluating another aspect instance.
    ChildOf { instance: Uuid },
}

/// An aspect class bound to one target declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectInstance {
    pub uuid: Uuid,
    /// Name of the aspect class.
    pub aspect: String,
    pub target: DeclarationId,
    pub predecessor: InstancePredecessor,
}

impl AspectInstance {
    pub fn new(
        aspect: impl Into<String>,
        target: DeclarationId,
        predecessor: InstancePredecessor,
    ) -> AspectInstance {
        AspectInstance {
            uuid: Uuid::new_v4(),
            aspect: aspect.into(),
            target,
            predecessor,
        }
    }
}

/// Something able to produce aspect instances for some aspect classes.
///
/// Aspect sources are attached to the step at depth -1 of the default layer of each of their
/// aspect classes, and are asked for the instances only when that step executes, so they see the
/// tree as revised by all the previous layers.
pub trait AspectSource: Debug + Send + Sync {
    /// A human readable name of this source, used in the diagnostics.
    fn name(&self) -> &str;

    /// The names of the aspect classes this source produces instances of.
    fn aspect_classes(&self) -> Vec<String>;

    /// The instances of the aspect class `aspect`.
    fn get_aspect_instances(&self, aspect: &str, tree: &DeclarationTree) -> Vec<AspectInstance>;

    /// The declarations that must not receive an instance of `aspect`. The exclusion applies
    /// also to all the descendants of the returned declarations.
    fn get_exclusions(&self, _aspect: &str, _tree: &DeclarationTree) -> Vec<DeclarationId> {
        vec![]
    }
}

/// An [`AspectSource`] with a fixed list of applications.
#[derive(Debug, Clone, Default)]
pub struct StaticAspectSource {
    name: String,
    applications: Vec<(String, DeclarationId)>,
    exclusions: Vec<(String, DeclarationId)>,
}

impl StaticAspectSource {
    pub fn new(name: impl Into<String>) -> StaticAspectSource {
        StaticAspectSource {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Apply `aspect` to `target`.
    pub fn with_application(mut self, aspect: impl Into<String>, target: DeclarationId) -> Self {
        self.applications.push((aspect.into(), target));
        self
    }

    /// Prevent `aspect` from being applied to `target` and its descendants.
    pub fn with_exclusion(mut self, aspect: impl Into<String>, target: DeclarationId) -> Self {
        self.exclusions.push((aspect.into(), target));
        self
    }
}

impl AspectSource for StaticAspectSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn aspect_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = Vec::new();
        for (aspect, _) in &self.applications {
            if !classes.contains(aspect) {
                classes.push(aspect.clone());
            }
        }
        classes
    }

    fn get_aspect_instances(&self, aspect: &str, tree: &DeclarationTree) -> Vec<AspectInstance> {
        self.applications
            .iter()
            .filter(|(a, target)| a == aspect && tree.contains(*target))
            .map(|(a, target)| {
                AspectInstance::new(
                    a.clone(),
                    *target,
                    InstancePredecessor::Source {
                        name: self.name.clone(),
                    },
                )
            })
            .collect()
    }

    fn get_exclusions(&self, aspect: &str, _tree: &DeclarationTree) -> Vec<DeclarationId> {
        self.exclusions
            .iter()
            .filter(|(a, _)| a == aspect)
            .map(|(_, target)| *target)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Declaration, DeclarationKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_static_source() {
        let mut tree = DeclarationTree::new();
        let ty = tree.insert(None, Declaration::new("Service", DeclarationKind::Type));
        let foo = tree.insert(Some(ty), Declaration::new("Foo", DeclarationKind::Method));
        let source = StaticAspectSource::new("project")
            .with_application("Log", foo)
            .with_application("Cache", ty)
            .with_application("Log", ty)
            .with_exclusion("Log", ty);
        assert_eq!(source.aspect_classes(), vec!["Log", "Cache"]);
        let instances = source.get_aspect_instances("Log", &tree);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].target, foo);
        assert_eq!(
            instances[0].predecessor,
            InstancePredecessor::Source {
                name: "project".into()
            }
        );
        assert_eq!(source.get_exclusions("Log", &tree), vec![ty]);
        assert!(source.get_exclusions("Cache", &tree).is_empty());
    }
}
