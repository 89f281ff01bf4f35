#![allow(dead_code)]

use std::path::PathBuf;

pub use test_interface::*;

mod test_interface;

pub fn setup() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_nanos()
        .is_test(true)
        .try_init();
}

/// The project file of a fixture in `tests/projects`.
pub fn project_file<P: Into<PathBuf>>(name: P) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("projects")
        .join(name.into())
        .join("weave.yaml")
}
