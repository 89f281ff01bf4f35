mod common;
use common::TestInterface;

fn two_overrides(test: TestInterface) {
    test.success()
        .no_errors()
        .executed_steps(&[
            "Validate (#0) at depth -1",
            "Validate (#0) at depth 2",
            "Log (#1) at depth -1",
            "Log (#1) at depth 2",
        ])
        .members("App.Service", &["Foo_Source", "Foo_Validate", "Foo", "Bar"])
        .trace("App.Service.Foo", &["log Foo", "validate positive", "source"])
        .trace("App.Service.Foo_Validate", &["validate positive", "source"])
        .trace("App.Service.Bar", &["bar"])
        .rendered_contains("return this.Foo_Validate(x);")
        .rendered_contains("private int Foo_Source(int x)");
}

#[test]
fn two_overrides_local() {
    better_panic::install();

    two_overrides(TestInterface::run_local("two_overrides"));
}

#[test]
fn two_overrides_single_worker() {
    better_panic::install();

    two_overrides(TestInterface::run_single_worker("two_overrides"));
}

#[test]
fn two_overrides_cancelled() {
    better_panic::install();

    TestInterface::run_cancelled("two_overrides").fail("weaving cancelled before step Validate");
}
