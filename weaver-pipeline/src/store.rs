use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use weaver_model::{DeclarationId, Transformation};

/// All the transformations produced by a run, in creation order. It's written only by the
/// scheduler and it's a read-only input of the linker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationStore {
    transformations: Vec<Transformation>,
}

impl TransformationStore {
    /// Make an empty store.
    pub fn new() -> TransformationStore {
        TransformationStore::default()
    }

    /// Append a transformation, assigning its ordinal.
    pub fn push(&mut self, mut transformation: Transformation) {
        transformation.ordinal = self.transformations.len();
        self.transformations.push(transformation);
    }

    /// Iterate the transformations in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Transformation> {
        self.transformations.iter()
    }

    /// The number of stored transformations.
    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// The transformations whose subject is `id`, in creation order.
    pub fn for_subject(&self, id: DeclarationId) -> impl Iterator<Item = &Transformation> {
        self.transformations
            .iter()
            .filter(move |t| t.subject() == id)
    }

    /// Group the transformations by their subject.
    pub fn by_subject(&self) -> BTreeMap<DeclarationId, Vec<&Transformation>> {
        let mut groups: BTreeMap<DeclarationId, Vec<&Transformation>> = BTreeMap::new();
        for transformation in &self.transformations {
            groups
                .entry(transformation.subject())
                .or_default()
                .push(transformation);
        }
        groups
    }
}

impl FromIterator<Transformation> for TransformationStore {
    fn from_iter<T: IntoIterator<Item = Transformation>>(iter: T) -> Self {
        let mut store = TransformationStore::new();
        for transformation in iter {
            store.push(transformation);
        }
        store
    }
}
