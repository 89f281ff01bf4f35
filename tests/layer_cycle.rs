mod common;
use common::TestInterface;

#[test]
fn layer_cycle_local() {
    better_panic::install();

    TestInterface::run_local("layer_cycle").fail("ordering cycle");
}

#[test]
fn missing_project() {
    better_panic::install();

    TestInterface::run_local("does_not_exist").fail("Failed to read");
}
