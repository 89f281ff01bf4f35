mod common;
use common::TestInterface;

fn child_aspects(test: TestInterface) {
    test.success()
        .no_errors()
        .deferred(&["Metrics"])
        .artifact("observed.txt", "observed Shop.Catalog")
        .members(
            "Shop.Catalog",
            &["GetItem_Source", "GetItem", "GetSecret", "Legacy", "Current"],
        )
        .trace("Shop.Catalog.GetItem", &["log GetItem", "get item"])
        .trace("Shop.Catalog.GetSecret", &["get secret"])
        .trace("Shop.Catalog.Legacy", &["current"])
        .rendered_contains("this.Current();");
}

#[test]
fn child_aspects_local() {
    better_panic::install();

    child_aspects(TestInterface::run_local("child_aspects"));
}

#[test]
fn child_aspects_single_worker() {
    better_panic::install();

    child_aspects(TestInterface::run_single_worker("child_aspects"));
}
