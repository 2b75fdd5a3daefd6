// Match engine tests
use super::*;

use std::collections::HashMap;

/// A window stand-in with canned attribute values.
#[derive(Default)]
struct FakeWindow {
    ints: HashMap<Predef, i64>,
    strings: HashMap<Predef, String>,
    props_int: HashMap<String, i64>,
    props_str: HashMap<String, String>,
}

impl FakeWindow {
    fn with_name(name: &str) -> FakeWindow {
        let mut win = FakeWindow::default();
        win.strings.insert(Predef::Name, name.to_string());
        win
    }
}

impl MatchTarget for FakeWindow {
    fn predef_int(&self, predef: Predef) -> Option<i64> {
        self.ints.get(&predef).copied()
    }

    fn predef_str(&self, predef: Predef) -> Option<String> {
        self.strings.get(&predef).cloned()
    }

    fn property_int(&self, name: &str, _on_client: bool, _index: usize, _format: u32) -> Option<i64> {
        self.props_int.get(name).copied()
    }

    fn property_str(&self, name: &str, _on_client: bool, _index: usize) -> Option<String> {
        self.props_str.get(name).cloned()
    }

    fn property_atom_name(&self, name: &str, _on_client: bool, _index: usize) -> Option<String> {
        self.props_str.get(name).cloned()
    }
}

fn parse_ok(pattern: &str) -> Cond {
    let mut flags = TrackingFlags::default();
    match parse(pattern, &mut flags) {
        Ok(cond) => cond,
        Err(e) => panic!("failed parsing {:?}: {}", pattern, e),
    }
}

fn matches(pattern: &str, win: &FakeWindow) -> bool {
    match_once(win, &parse_ok(pattern))
}

#[test]
fn name_equality_matches_exactly() {
    let term = FakeWindow::with_name("Term");
    let other = FakeWindow::with_name("Terminator");

    assert!(matches("name = \"Term\"", &term));
    assert!(!matches("name = \"Term\"", &other));
}

#[test]
fn qualifiers_select_the_match_kind() {
    let win = FakeWindow::with_name("Mozilla Firefox");

    assert!(matches("name *= \"Firefox\"", &win));
    assert!(matches("name ^= \"Mozilla\"", &win));
    assert!(matches("name %= \"*Fire*\"", &win));
    assert!(matches("name ~= \"Fire(fox|bird)\"", &win));
    assert!(!matches("name ^= \"Firefox\"", &win));
}

#[test]
fn ignorecase_flag_applies() {
    let win = FakeWindow::with_name("URXVT");

    assert!(!matches("name = \"urxvt\"", &win));
    assert!(matches("name ?= \"urxvt\"", &win));
    assert!(matches("name *?= \"rxv\"", &win));
}

#[test]
fn integer_comparisons() {
    let mut win = FakeWindow::default();
    win.ints.insert(Predef::Width, 640);

    assert!(matches("width = 640", &win));
    assert!(matches("width > 100", &win));
    assert!(matches("width >= 640", &win));
    assert!(!matches("width < 640", &win));
    assert!(matches("width <= 640", &win));
    assert!(matches("width = 0x280", &win));
}

#[test]
fn boolean_patterns() {
    let mut win = FakeWindow::default();
    win.ints.insert(Predef::Fullscreen, 1);
    win.ints.insert(Predef::OverrideRedirect, 0);

    assert!(matches("fullscreen = true", &win));
    assert!(matches("override_redirect = false", &win));
    assert!(matches("fullscreen", &win));
    assert!(!matches("override_redirect", &win));
}

#[test]
fn logical_operators_and_grouping() {
    let mut win = FakeWindow::with_name("Term");
    win.ints.insert(Predef::Width, 640);

    assert!(matches("name = \"Term\" && width = 640", &win));
    assert!(!matches("name = \"Term\" && width = 1", &win));
    assert!(matches("name = \"xyz\" || width = 640", &win));
    assert!(matches("(name = \"xyz\" || width = 640) && width > 0", &win));
}

#[test]
fn and_binds_tighter_than_or() {
    // a || b && c parses as a || (b && c)
    let cond = parse_ok("name = \"a\" || name = \"b\" && width = 1");
    match cond {
        Cond::Branch { op, right, .. } => {
            assert_eq!(op, BranchOp::Or);
            match *right {
                Cond::Branch { op, .. } => assert_eq!(op, BranchOp::And),
                other => panic!("expected And branch on the right, got {:?}", other),
            }
        }
        other => panic!("expected Or at the root, got {:?}", other),
    }
}

#[test]
fn de_morgan_holds_behaviorally() {
    let windows = [
        {
            let mut w = FakeWindow::with_name("Term");
            w.ints.insert(Predef::Width, 640);
            w
        },
        {
            let mut w = FakeWindow::with_name("Term");
            w.ints.insert(Predef::Width, 1);
            w
        },
        {
            let mut w = FakeWindow::with_name("other");
            w.ints.insert(Predef::Width, 640);
            w
        },
        {
            let mut w = FakeWindow::with_name("other");
            w.ints.insert(Predef::Width, 1);
            w
        },
    ];

    let negated_and = parse_ok("!(name = \"Term\" && width = 640)");
    let or_of_negations = parse_ok("!name = \"Term\" || !width = 640");

    for win in windows.iter() {
        assert_eq!(
            match_once(win, &negated_and),
            match_once(win, &or_of_negations)
        );
    }
}

#[test]
fn missing_property_is_false_for_exists() {
    let win = FakeWindow::default();
    assert!(!matches("_SOME_PROP:32c", &win));
    // Negated exists on a missing property is true
    assert!(matches("!_SOME_PROP:32c", &win));
}

#[test]
fn raw_properties_evaluate() {
    let mut win = FakeWindow::default();
    win.props_int.insert("_NET_WM_DESKTOP".to_string(), 3);
    win.props_str
        .insert("_GTK_THEME".to_string(), "dark".to_string());

    assert!(matches("_NET_WM_DESKTOP:32c = 3", &win));
    assert!(!matches("_NET_WM_DESKTOP:32c = 4", &win));
    assert!(matches("_GTK_THEME:8s = \"dark\"", &win));
}

#[test]
fn legacy_expressions_parse() {
    let term = FakeWindow::with_name("Terminator");

    assert!(matches("n:e:Terminator", &term));
    assert!(matches("n:a:mina", &term));
    assert!(matches("n:s:Term", &term));
    assert!(matches("n:w:Term*", &term));
    assert!(!matches("n:e:Term", &term));
}

#[test]
fn legacy_class_and_role_targets() {
    let mut win = FakeWindow::default();
    win.strings.insert(Predef::ClassG, "Navigator".to_string());
    win.strings.insert(Predef::ClassI, "firefox".to_string());
    win.strings.insert(Predef::Role, "browser".to_string());

    assert!(matches("g:e:Navigator", &win));
    assert!(matches("i:e:firefox", &win));
    assert!(matches("r:e:browser", &win));
}

#[test]
fn round_trip_preserves_structure() {
    let cases = [
        "name = \"Term\"",
        "!name = \"Term\"",
        "name *?= \"term\"",
        "width > 100",
        "width >= 0x10",
        "fullscreen = true",
        "(name = \"a\" || name = \"b\") && width < 50",
        "name = \"a\" || name = \"b\" && width < 50",
        "_NET_WM_DESKTOP:32c = 3",
        "_PROP[2]:8s = \"x\"",
        "client@:32w = 5",
        "!_SOME_PROP:32c",
        "name ~= \"^Fire.*$\"",
        "name %= \"Fire*\"",
    ];

    for case in cases.iter() {
        let parsed = parse_ok(case);
        let printed = parsed.to_string();
        let reparsed = parse_ok(&printed);
        assert_eq!(parsed, reparsed, "case {:?} printed as {:?}", case, printed);
    }
}

#[test]
fn nesting_depth_is_limited() {
    let deep = format!("{}name = \"x\"{}", "(".repeat(12), ")".repeat(12));
    let mut flags = TrackingFlags::default();
    assert!(parse(&deep, &mut flags).is_err());
}

#[test]
fn parse_errors_are_reported() {
    let bad = [
        "",
        "name =",
        "name = \"unterminated",
        "&& name = \"x\"",
        "name = \"x\" &&",
        "(name = \"x\"",
        "width *= 5",
        "name > \"x\"",
    ];
    for case in bad.iter() {
        let mut flags = TrackingFlags::default();
        assert!(parse(case, &mut flags).is_err(), "case {:?}", case);
    }
}

#[test]
fn parsing_sets_tracking_flags() {
    let mut flags = TrackingFlags::default();
    parse("focused = true", &mut flags).unwrap();
    assert!(flags.track_focus);
    assert!(!flags.track_wdata);

    let mut flags = TrackingFlags::default();
    parse("class_g = \"Term\"", &mut flags).unwrap();
    assert!(flags.track_wdata);

    let mut flags = TrackingFlags::default();
    parse("_NET_WM_DESKTOP:32c = 3", &mut flags).unwrap();
    assert_eq!(flags.tracked_atoms, vec!["_NET_WM_DESKTOP".to_string()]);
}

#[test]
fn rule_list_returns_first_matching_data() {
    let mut flags = TrackingFlags::default();
    let mut list = RuleList::new();
    list.parse_add("name = \"a\"", 10, &mut flags).unwrap();
    list.parse_add("name = \"b\"", 20, &mut flags).unwrap();

    let win = FakeWindow::with_name("b");
    assert_eq!(list.matches(&win), Some(20));

    // The cache answers repeated queries for the same kind of window
    assert_eq!(list.matches(&win), Some(20));

    let miss = FakeWindow::with_name("zzz");
    assert_eq!(list.matches(&miss), None);
}

#[test]
fn opacity_rule_shape() {
    // The config layer splits "85:name = \"x\"" and stores 85 as data
    let mut flags = TrackingFlags::default();
    let mut list = RuleList::new();
    list.parse_add("class_g = \"Term\"", 50, &mut flags).unwrap();

    let mut win = FakeWindow::default();
    win.strings.insert(Predef::ClassG, "Term".to_string());
    assert_eq!(list.matches(&win), Some(50));
}
