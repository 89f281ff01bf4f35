//! Data model shared by the weaving pipeline and the linker.
//!
//! The program to transform is described by a [`DeclarationTree`]: namespaces, types and their
//! members, each with a nesting depth. Aspects are split in ordered [`AspectLayerId`]s whose
//! global order is computed by [`AspectLayerGraph::sort`]. When an [`AspectInstance`] is evaluated
//! it produces [`Advice`], and the evaluation of the advice produces immutable
//! [`Transformation`]s that are finally consumed by the linker.
//!
//! # Example
//!
//! Describing a type with a single method and ordering two aspects.
//! ```
//! use weaver_model::*;
//!
//! let mut tree = DeclarationTree::new();
//! let ns = tree.insert(None, Declaration::new("App", DeclarationKind::Namespace));
//! let service = tree.insert(Some(ns), Declaration::new("Service", DeclarationKind::Type));
//! let foo = tree.insert(
//!     Some(service),
//!     Declaration::new("Foo", DeclarationKind::Method).with_body(Accessor::Invoke, Body::text(["emit foo"])),
//! );
//! assert_eq!(tree.depth_of(foo), Some(2));
//! assert_eq!(tree.path(foo), "App.Service.Foo");
//!
//! let mut graph = AspectLayerGraph::new();
//! graph.add_aspect(AspectClass::new("Logging"));
//! graph.add_aspect(AspectClass::new("Caching"));
//! graph.add_constraint(LayerSelector::aspect("Caching"), LayerSelector::aspect("Logging"));
//! let order = graph.sort().unwrap();
//! assert!(order.order_index(&AspectLayerId::default_layer("Caching")) < order.order_index(&AspectLayerId::default_layer("Logging")));
//! ```

mod advice;
mod aspect;
mod body;
mod declaration;
mod layer;
mod transformation;

pub use advice::*;
pub use aspect::*;
pub use body::*;
pub use declaration::*;
pub use layer::*;
pub use transformation::*;
