//! The project file: the declarations to weave, the aspect classes, their ordering and where
//! they are applied.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Error};
use serde::{Deserialize, Serialize};

use weaver_model::{
    Accessibility, Accessor, AspectClass, AspectLayerGraph, AspectLayerOrder, AspectSource, Body,
    Declaration, DeclarationId, DeclarationKind, DeclarationTree, LayerSelector,
    OverrideStrategy, Parameter, Signature, StaticAspectSource, CONSTRUCTOR_NAME, FINALIZER_NAME,
    INDEXER_NAME,
};

/// The name of the aspect source made of the `apply` and `exclude` entries of the project.
pub const PROJECT_SOURCE_NAME: &str = "project file";

/// A weaving project, as read from a YAML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    /// The aspect classes of the project.
    #[serde(default)]
    pub aspects: Vec<AspectSpec>,
    /// The ordering constraints between the layers.
    #[serde(default)]
    pub order: Vec<OrderSpec>,
    /// The types of the program, with their members.
    #[serde(default)]
    pub types: Vec<TypeSpec>,
    /// Where the aspects are applied.
    #[serde(default)]
    pub apply: Vec<ApplySpec>,
    /// Where the aspects must not be applied, also through child aspects.
    #[serde(default)]
    pub exclude: Vec<ApplySpec>,
}

/// An aspect class described declaratively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AspectSpec {
    pub name: String,
    /// The non-default layers of the aspect, in their implicit order.
    #[serde(default)]
    pub layers: Vec<String>,
    /// If not empty, the aspect can only be applied to declarations of these kinds.
    #[serde(default)]
    pub eligible: Vec<DeclarationKind>,
    /// The advice produced by every instance.
    #[serde(default)]
    pub advice: Vec<AdviceSpec>,
    /// The aspects applied by every instance to the children of its target.
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

/// Which declarations an advice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceTargetSpec {
    /// The target of the aspect instance.
    #[default]
    #[serde(rename = "self")]
    Declaration,
    /// The children of the target of the aspect instance.
    Members,
}

/// An advice produced by an aspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceSpec {
    /// The layer of the aspect the advice is executed in, the default layer if missing.
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub on: AdviceTargetSpec,
    /// Filters the names of the children when `on` is `members`.
    #[serde(default)]
    pub filter: MemberFilter,
    /// Arguments of the templates, in addition to `aspect` and `target`.
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    #[serde(flatten)]
    pub kind: AdviceKindSpec,
}

/// What an advice does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdviceKindSpec {
    /// Override some accessors of the declaration.
    Override {
        templates: BTreeMap<Accessor, Vec<String>>,
    },
    /// Introduce a member in the type.
    Introduce {
        member: MemberSpec,
        #[serde(default)]
        when_exists: OverrideStrategy,
    },
    /// Check some condition on the way in or out of an accessor.
    Contract {
        /// The first accessor of the declaration if missing.
        #[serde(default)]
        accessor: Option<Accessor>,
        #[serde(default)]
        direction: weaver_model::ContractDirection,
        lines: Vec<String>,
    },
    /// Forward the declaration to another member of the same type.
    Redirect { to: String },
    /// Write an additional artifact.
    Resource { name: String, content: String },
}

/// Selects the children of a declaration by name and kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberFilter {
    /// A wildcard pattern (`*` and `?`) on the names.
    #[serde(default = "default_pattern")]
    pub name: String,
    /// If not empty, only the children of these kinds.
    #[serde(default)]
    pub kinds: Vec<DeclarationKind>,
}

fn default_pattern() -> String {
    "*".into()
}

impl Default for MemberFilter {
    fn default() -> Self {
        MemberFilter {
            name: default_pattern(),
            kinds: vec![],
        }
    }
}

impl MemberFilter {
    /// Whether the declaration is selected by this filter.
    pub fn matches(&self, declaration: &Declaration) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&declaration.kind))
            && wildmatch::WildMatch::new(&self.name).matches(&declaration.name)
    }
}

/// An aspect applied to the children of the target of each instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildSpec {
    pub aspect: String,
    #[serde(flatten)]
    pub filter: MemberFilter,
}

/// `first` executes before `then`. Both are either an aspect name or `Aspect:layer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub first: String,
    pub then: String,
}

/// An aspect applied to the declaration at a dotted path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplySpec {
    pub aspect: String,
    /// The path of the declaration, e.g. `App.Service.Foo` or `App.Service.Foo(int)`.
    pub target: String,
}

/// A type of the program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSpec {
    /// The dotted namespace of a top-level type.
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub value_type: bool,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub type_parameters: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
    /// The nested types.
    #[serde(default)]
    pub types: Vec<TypeSpec>,
}

/// Which accessors are compiler generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoSpec {
    /// All the accessors without an explicit body, or none.
    All(bool),
    /// Only these accessors.
    Accessors(Vec<Accessor>),
}

impl Default for AutoSpec {
    fn default() -> Self {
        AutoSpec::All(false)
    }
}

/// A member of a type, or a member to introduce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSpec {
    /// Constructors, finalizers and indexers default to their reserved names. Operators are
    /// named by their symbol.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: DeclarationKind,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub type_parameters: Vec<String>,
    /// Shorthand for the `invoke` accessor.
    #[serde(default)]
    pub body: Option<Vec<String>>,
    #[serde(default)]
    pub accessors: BTreeMap<Accessor, Vec<String>>,
    #[serde(default)]
    pub auto: AutoSpec,
    /// The member is not written in the source.
    #[serde(default)]
    pub implicit: bool,
}

fn default_kind() -> DeclarationKind {
    DeclarationKind::Method
}

impl MemberSpec {
    /// The name of the member, defaulting to the reserved one of its kind.
    pub fn name(&self) -> Result<String, Error> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }
        match self.kind {
            DeclarationKind::Constructor => Ok(CONSTRUCTOR_NAME.into()),
            DeclarationKind::Finalizer => Ok(FINALIZER_NAME.into()),
            DeclarationKind::Indexer => Ok(INDEXER_NAME.into()),
            kind => bail!("A {} must have a name", kind),
        }
    }

    pub fn signature(&self) -> Signature {
        Signature {
            parameters: self.parameters.clone(),
            return_type: self.returns.clone(),
        }
    }

    /// The explicit bodies of the member, by accessor.
    pub fn bodies(&self) -> Result<BTreeMap<Accessor, Vec<String>>, Error> {
        let mut bodies = self.accessors.clone();
        if let Some(body) = &self.body {
            if bodies.insert(Accessor::Invoke, body.clone()).is_some() {
                bail!("Both body and the invoke accessor are specified");
            }
        }
        for accessor in bodies.keys() {
            if !self.kind.accessors().contains(accessor) {
                bail!("A {} doesn't have the {} accessor", self.kind, accessor);
            }
        }
        Ok(bodies)
    }

    /// The compiler generated accessors of the member.
    pub fn auto_accessors(&self) -> Result<Vec<Accessor>, Error> {
        let bodies = self.bodies()?;
        let accessors = match &self.auto {
            AutoSpec::All(false) => vec![],
            AutoSpec::All(true) => self
                .kind
                .accessors()
                .iter()
                .filter(|a| !bodies.contains_key(a))
                .copied()
                .collect(),
            AutoSpec::Accessors(accessors) => accessors.clone(),
        };
        for accessor in &accessors {
            if !self.kind.accessors().contains(accessor) {
                bail!("A {} doesn't have the {} accessor", self.kind, accessor);
            }
            if bodies.contains_key(accessor) {
                bail!("The {} accessor has both a body and is auto", accessor);
            }
        }
        Ok(accessors)
    }

    /// Build the declaration of this member.
    pub fn declaration(&self) -> Result<Declaration, Error> {
        if !self.kind.is_member() {
            bail!("A {} cannot be a member", self.kind);
        }
        let mut declaration = Declaration::new(self.name()?, self.kind)
            .with_signature(self.signature())
            .with_accessibility(self.accessibility)
            .with_type_parameters(self.type_parameters.iter().cloned());
        for (accessor, lines) in self.bodies()? {
            declaration = declaration.with_body(accessor, Body::text(lines));
        }
        for accessor in self.auto_accessors()? {
            declaration = declaration.with_auto_accessor(accessor);
        }
        if self.implicit {
            declaration = declaration.implicit();
        }
        Ok(declaration)
    }
}

impl FromStr for Project {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s).context("Invalid project file")
    }
}

impl Project {
    /// Read a project from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Project, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Project::from_str(&content).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// The aspect class with this name.
    pub fn aspect(&self, name: &str) -> Option<&AspectSpec> {
        self.aspects.iter().find(|a| a.name == name)
    }

    /// Build the declaration tree of the program.
    pub fn build_tree(&self) -> Result<DeclarationTree, Error> {
        let mut tree = DeclarationTree::new();
        let mut namespaces = HashMap::new();
        for ty in &self.types {
            let parent = match &ty.namespace {
                Some(namespace) => Some(namespace_id(&mut tree, &mut namespaces, namespace)?),
                None => None,
            };
            insert_type(&mut tree, parent, ty)?;
        }
        debug!("The project has {} declarations", tree.len());
        Ok(tree)
    }

    /// The aspect classes with the ordering constraints between their layers.
    pub fn layer_graph(&self) -> Result<AspectLayerGraph, Error> {
        let mut graph = AspectLayerGraph::new();
        for aspect in &self.aspects {
            let class = aspect
                .layers
                .iter()
                .fold(AspectClass::new(&aspect.name), |class, layer| {
                    class.with_layer(layer)
                });
            graph.add_aspect(class);
        }
        for constraint in &self.order {
            let first = LayerSelector::from_str(&constraint.first)
                .map_err(|e| anyhow!(e))
                .context("Invalid ordering constraint")?;
            let then = LayerSelector::from_str(&constraint.then)
                .map_err(|e| anyhow!(e))
                .context("Invalid ordering constraint")?;
            graph.add_constraint(first, then);
        }
        Ok(graph)
    }

    /// The global order of all the layers of the project.
    pub fn layer_order(&self) -> Result<AspectLayerOrder, Error> {
        self.layer_graph()?
            .sort()
            .context("Cannot order the aspect layers")
    }

    /// The aspect sources of the `apply` and `exclude` entries, resolved against the tree.
    pub fn aspect_sources(
        &self,
        tree: &DeclarationTree,
    ) -> Result<Vec<Arc<dyn AspectSource>>, Error> {
        let mut source = StaticAspectSource::new(PROJECT_SOURCE_NAME);
        for apply in &self.apply {
            let target = resolve(tree, &apply.target)
                .with_context(|| format!("Cannot apply {}", apply.aspect))?;
            source = source.with_application(&apply.aspect, target);
        }
        for exclude in &self.exclude {
            let target = resolve(tree, &exclude.target)
                .with_context(|| format!("Cannot exclude {}", exclude.aspect))?;
            source = source.with_exclusion(&exclude.aspect, target);
        }
        Ok(vec![Arc::new(source)])
    }
}

fn resolve(tree: &DeclarationTree, path: &str) -> Result<DeclarationId, Error> {
    tree.find_by_path(path)
        .ok_or_else(|| anyhow!("Unknown declaration {}", path))
}

/// The id of a namespace, creating it and its parents if needed.
fn namespace_id(
    tree: &mut DeclarationTree,
    namespaces: &mut HashMap<String, DeclarationId>,
    path: &str,
) -> Result<DeclarationId, Error> {
    let mut parent = None;
    let mut current = String::new();
    for segment in path.split('.') {
        if segment.is_empty() {
            bail!("Invalid namespace {:?}", path);
        }
        if !current.is_empty() {
            current.push('.');
        }
        current.push_str(segment);
        let id = *namespaces.entry(current.clone()).or_insert_with(|| {
            tree.insert(parent, Declaration::new(segment, DeclarationKind::Namespace))
        });
        parent = Some(id);
    }
    parent.ok_or_else(|| anyhow!("Empty namespace"))
}

fn insert_type(
    tree: &mut DeclarationTree,
    parent: Option<DeclarationId>,
    spec: &TypeSpec,
) -> Result<DeclarationId, Error> {
    let mut declaration = Declaration::new(&spec.name, DeclarationKind::Type)
        .with_accessibility(spec.accessibility)
        .with_type_parameters(spec.type_parameters.iter().cloned());
    if spec.value_type {
        declaration = declaration.value_type();
    }
    let ty = tree.insert(parent, declaration);
    for member in &spec.members {
        let declaration = member
            .declaration()
            .with_context(|| format!("Invalid member of {}", tree.path(ty)))?;
        if tree
            .find_member(ty, &declaration.name, declaration.kind, &declaration.signature)
            .is_some()
        {
            bail!(
                "Duplicate {} {} in {}",
                declaration.kind,
                declaration.name,
                tree.path(ty)
            );
        }
        tree.insert(Some(ty), declaration);
    }
    for nested in &spec.types {
        insert_type(tree, Some(ty), nested)?;
    }
    Ok(ty)
}
