use ev_test_example::{demo_dir, demo_names, testcase_path};

#[test]
fn every_demo_matches_its_testcase() {
    let names = demo_names();
    assert!(!names.is_empty(), "expected demo cases under demos/");

    let failures = names
        .iter()
        .filter_map(|name| {
            ev_tool::assert_case(&demo_dir(name), &testcase_path(name))
                .err()
                .map(|error| format!("{}: {}", name, error))
        })
        .collect::<Vec<_>>();

    assert!(failures.is_empty(), "demo failures:\n{}", failures.join("\n"));
}

#[test]
fn resumable_demos_really_restore() {
    for name in [
        "02-branch-resume",
        "03-while-state",
        "06-nested-calls",
        "11-branch-in-loop",
        "12-call-args",
    ] {
        let case = ev_tool::read_test_case(&testcase_path(name)).expect("case should parse");
        let report = ev_tool::run_case(&demo_dir(name), &case).expect("case should run");
        assert!(report.restored, "{} did not restore", name);
    }
}
