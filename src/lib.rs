//! # aspect-weaver
//!
//! This is both an application and a library, the library can be used to weave a project from
//! inside your application.
//!
//! A project describes a tree of declarations and a set of aspect classes, split in ordered
//! layers. [`weave`] runs all the aspects through the pipeline scheduler, in the global order of
//! their layers and by nesting depth, and then links the transformations they produced: a
//! declaration overridden by many aspects becomes a chain of members, each calling the previous
//! one.
//!
//! ```
//! use std::str::FromStr;
//! use aspect_weaver::{weave, Project, WeaveOptions};
//!
//! let project = Project::from_str(r#"
//! aspects:
//!   - name: Logging
//!     advice:
//!       - kind: override
//!         templates:
//!           invoke: ["emit log", "proceed"]
//! types:
//!   - name: Service
//!     members:
//!       - name: Foo
//!         body: ["emit foo"]
//! apply:
//!   - aspect: Logging
//!     target: Service.Foo
//! "#).unwrap();
//! let result = weave(&project, &WeaveOptions::default()).unwrap();
//! assert!(!result.has_errors());
//! assert_eq!(result.output.types[0].member_names(), vec!["Foo_Source", "Foo"]);
//! ```

#[macro_use]
extern crate log;

pub mod aspects;
pub mod config;
pub mod error;
pub mod opt;
pub mod run;
pub mod ui;
pub mod weave;

pub use aspects::DeclarativeAspectEvaluator;
pub use config::Project;
pub use opt::*;
pub use run::main_weave;
pub use weave::*;
