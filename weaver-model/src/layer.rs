use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The identifier of a layer of an aspect. The layer `None` is the default layer, the one that
/// initializes the aspect instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AspectLayerId {
    /// The name of the aspect class.
    pub aspect: String,
    /// The name of the layer, `None` for the default one.
    pub layer: Option<String>,
}

impl AspectLayerId {
    pub fn new(aspect: impl Into<String>, layer: Option<&str>) -> AspectLayerId {
        AspectLayerId {
            aspect: aspect.into(),
            layer: layer.map(String::from),
        }
    }

    /// The default layer of an aspect.
    pub fn default_layer(aspect: impl Into<String>) -> AspectLayerId {
        AspectLayerId {
            aspect: aspect.into(),
            layer: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.layer.is_none()
    }

    /// A string usable inside an identifier that names this layer: `Aspect` or `Aspect_layer`.
    pub fn suffix(&self) -> String {
        let raw = match &self.layer {
            Some(layer) => format!("{}_{}", self.aspect, layer),
            None => self.aspect.clone(),
        };
        raw.chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }
}

impl Display for AspectLayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.layer {
            Some(layer) => write!(f, "{}:{}", self.aspect, layer),
            None => f.write_str(&self.aspect),
        }
    }
}

impl FromStr for AspectLayerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((aspect, layer)) if !aspect.is_empty() && !layer.is_empty() => {
                Ok(AspectLayerId::new(aspect, Some(layer)))
            }
            Some(_) => Err(format!("Invalid aspect layer: {}", s)),
            None if s.is_empty() => Err("Empty aspect layer".to_string()),
            None => Ok(AspectLayerId::default_layer(s)),
        }
    }
}

/// An aspect class with the list of its non-default layers, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectClass {
    pub name: String,
    pub layers: Vec<String>,
}

impl AspectClass {
    pub fn new(name: impl Into<String>) -> AspectClass {
        AspectClass {
            name: name.into(),
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// All the layers of this class, starting from the default one.
    pub fn layer_ids(&self) -> Vec<AspectLayerId> {
        std::iter::once(AspectLayerId::default_layer(&self.name))
            .chain(
                self.layers
                    .iter()
                    .map(|l| AspectLayerId::new(&self.name, Some(l))),
            )
            .collect()
    }
}

/// Selects the layers an ordering constraint is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerSelector {
    /// All the layers of an aspect class.
    Aspect(String),
    /// A single layer.
    Layer(AspectLayerId),
}

impl LayerSelector {
    pub fn aspect(name: impl Into<String>) -> LayerSelector {
        LayerSelector::Aspect(name.into())
    }

    pub fn layer(aspect: impl Into<String>, layer: &str) -> LayerSelector {
        LayerSelector::Layer(AspectLayerId::new(aspect, Some(layer)))
    }
}

impl FromStr for LayerSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = AspectLayerId::from_str(s)?;
        if id.is_default() {
            Ok(LayerSelector::Aspect(id.aspect))
        } else {
            Ok(LayerSelector::Layer(id))
        }
    }
}

/// The layers selected by `first` execute before the ones selected by `then`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConstraint {
    pub first: LayerSelector,
    pub then: LayerSelector,
}

/// An error in the ordering of the aspect layers. These are configuration errors: the pipeline
/// cannot start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayerOrderError {
    /// The same aspect class has been declared twice.
    #[error("duplicate aspect class {name}")]
    DuplicateAspect {
        /// The name of the aspect class.
        name: String,
    },
    /// An ordering constraint references an unknown aspect class.
    #[error("unknown aspect class {name} in an ordering constraint")]
    UnknownAspect {
        /// The name of the aspect class.
        name: String,
    },
    /// An ordering constraint references an unknown layer.
    #[error("unknown aspect layer {layer} in an ordering constraint")]
    UnknownLayer {
        /// The name of the layer.
        layer: String,
    },
    /// The constraints cannot be satisfied.
    #[error("detected ordering cycle, '{layer}' is in the cycle")]
    Cycle {
        /// A layer inside the cycle.
        layer: String,
    },
}

/// The aspect classes of a run together with the ordering constraints between their layers.
#[derive(Debug, Clone, Default)]
pub struct AspectLayerGraph {
    classes: Vec<AspectClass>,
    constraints: Vec<OrderConstraint>,
}

impl AspectLayerGraph {
    pub fn new() -> AspectLayerGraph {
        AspectLayerGraph::default()
    }

    /// Add an aspect class. The declaration order of the classes breaks the ties of the sort.
    pub fn add_aspect(&mut self, class: AspectClass) {
        self.classes.push(class);
    }

    pub fn add_constraint(&mut self, first: LayerSelector, then: LayerSelector) {
        self.constraints.push(OrderConstraint { first, then });
    }

    pub fn classes(&self) -> &[AspectClass] {
        &self.classes
    }

    /// Compute the global order of all the layers. The default layer of each aspect is before
    /// its other layers, which keep their declaration order. Layers not constrained relative to
    /// each other are ordered by the declaration order of their classes.
    pub fn sort(&self) -> Result<AspectLayerOrder, LayerOrderError> {
        let mut nodes: Vec<AspectLayerId> = Vec::new();
        let mut rank: HashMap<AspectLayerId, usize> = HashMap::new();
        let mut class_nodes: HashMap<&str, Vec<usize>> = HashMap::new();
        for class in &self.classes {
            if class_nodes.contains_key(class.name.as_str()) {
                return Err(LayerOrderError::DuplicateAspect {
                    name: class.name.clone(),
                });
            }
            let ids = class.layer_ids();
            let mut indices = Vec::with_capacity(ids.len());
            for id in ids {
                if rank.contains_key(&id) {
                    return Err(LayerOrderError::Cycle {
                        layer: id.to_string(),
                    });
                }
                rank.insert(id.clone(), nodes.len());
                indices.push(nodes.len());
                nodes.push(id);
            }
            class_nodes.insert(class.name.as_str(), indices);
        }

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
        let mut in_degree = vec![0usize; nodes.len()];
        let mut add_edge = |from: usize, to: usize| -> Result<(), LayerOrderError> {
            if from == to {
                return Err(LayerOrderError::Cycle {
                    layer: nodes[from].to_string(),
                });
            }
            if successors[from].insert(to) {
                in_degree[to] += 1;
            }
            Ok(())
        };
        for indices in class_nodes.values() {
            for pair in indices.windows(2) {
                add_edge(pair[0], pair[1])?;
            }
        }
        let select = |selector: &LayerSelector| -> Result<Vec<usize>, LayerOrderError> {
            match selector {
                LayerSelector::Aspect(name) => class_nodes
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| LayerOrderError::UnknownAspect { name: name.clone() }),
                LayerSelector::Layer(id) => {
                    if !class_nodes.contains_key(id.aspect.as_str()) {
                        return Err(LayerOrderError::UnknownAspect {
                            name: id.aspect.clone(),
                        });
                    }
                    rank.get(id)
                        .map(|r| vec![*r])
                        .ok_or_else(|| LayerOrderError::UnknownLayer {
                            layer: id.to_string(),
                        })
                }
            }
        };
        for constraint in &self.constraints {
            let first = select(&constraint.first)?;
            let then = select(&constraint.then)?;
            for from in &first {
                for to in &then {
                    add_edge(*from, *to)?;
                }
            }
        }

        // visit the graph always picking the ready layer declared first
        let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|n| in_degree[*n] == 0).collect();
        let mut sorted = Vec::with_capacity(nodes.len());
        while let Some(node) = ready.pop_first() {
            sorted.push(node);
            for next in &successors[node] {
                in_degree[*next] -= 1;
                if in_degree[*next] == 0 {
                    ready.insert(*next);
                }
            }
        }
        if sorted.len() < nodes.len() {
            let layer = (0..nodes.len())
                .find(|n| in_degree[*n] > 0)
                .map(|n| nodes[n].to_string())
                .unwrap_or_default();
            return Err(LayerOrderError::Cycle { layer });
        }
        Ok(AspectLayerOrder::from_ids(
            sorted.into_iter().map(|n| nodes[n].clone()),
        ))
    }
}

/// A layer with its position in the global order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectLayer {
    pub id: AspectLayerId,
    /// Position of the layer in the global order, lower executes first.
    pub order_index: usize,
}

impl AspectLayer {
    pub fn is_default(&self) -> bool {
        self.id.is_default()
    }
}

/// The total order of all the layers of a run. It is computed once per run and passed
/// explicitly to the components that need it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AspectLayerOrder {
    layers: Vec<AspectLayer>,
    index: HashMap<AspectLayerId, usize>,
}

impl AspectLayerOrder {
    /// Build an order from an already sorted list of layers.
    pub fn from_ids<I: IntoIterator<Item = AspectLayerId>>(ids: I) -> AspectLayerOrder {
        let mut order = AspectLayerOrder::default();
        for id in ids {
            if order.index.contains_key(&id) {
                continue;
            }
            let order_index = order.layers.len();
            order.index.insert(id.clone(), order_index);
            order.layers.push(AspectLayer { id, order_index });
        }
        order
    }

    /// The position of a layer in the global order, `None` if the layer is unknown.
    pub fn order_index(&self, id: &AspectLayerId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, order_index: usize) -> Option<&AspectLayer> {
        self.layers.get(order_index)
    }

    pub fn contains(&self, id: &AspectLayerId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AspectLayer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
