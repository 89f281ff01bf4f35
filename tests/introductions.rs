mod common;
use common::TestInterface;

fn introductions(test: TestInterface) {
    test.success()
        .no_errors()
        .members("Ignored", &["Bar"])
        .trace("Ignored.Bar", &["bar"])
        .members("Overridden", &["Bar_Source", "Bar"])
        .trace("Overridden.Bar", &["introduced", "bar"])
        .members("Hidden", &["Bar", "Bar"])
        .rendered_contains("public new void Bar()")
        .members("Audited", &["Log_Audit", "Log"])
        .trace("Audited.Log", &["trace Trace", "log"])
        .rendered_contains("private void Log_Audit(string message)");
}

fn introduction_conflict(test: TestInterface) {
    test.success()
        .error_count(2)
        .diagnostic("Cannot introduce the method Bar")
        .diagnostic("Log cannot be applied to a type")
        .members("Service", &["Bar", "Baz_Source", "Baz"])
        .trace("Service.Bar", &["bar"])
        .trace("Service.Baz", &["log", "baz"]);
}

#[test]
fn introductions_local() {
    better_panic::install();

    introductions(TestInterface::run_local("introductions"));
}

#[test]
fn introductions_single_worker() {
    better_panic::install();

    introductions(TestInterface::run_single_worker("introductions"));
}

#[test]
fn introduction_conflict_local() {
    better_panic::install();

    introduction_conflict(TestInterface::run_local("introduction_conflict"));
}
