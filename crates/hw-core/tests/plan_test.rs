//! Planner properties over whole documents: determinism, injectivity, and
//! the reference topologies used throughout the CLI docs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use hw_core::plan::{pane_matches, plan, Plan, PlanMode};
use hw_core::spec::{LegacySpec, OrgSpec, Spec, SpecDocument, SpecError};

fn document(rooms: &[(&str, usize)]) -> String {
    let mut yaml = String::from("version: \"1.0\"\nspace:\n  name: team\n  rooms:\n");
    for (room, _) in rooms {
        yaml.push_str(&format!("    - name: {room}\n"));
    }
    yaml.push_str("  agents:\n");
    for (room, count) in rooms {
        for i in 0..*count {
            let role = if i == 0 { "pm" } else { "worker" };
            yaml.push_str(&format!(
                "    - name: {room}-{i}\n      room: {room}\n      role: {role}\n"
            ));
        }
    }
    yaml
}

fn plan_for(yaml: &str) -> Plan {
    let spec = SpecDocument::from_yaml_str(yaml).unwrap().into_spec();
    plan("team", &spec, Path::new("/ws/team")).unwrap()
}

#[test]
fn scenario_a_three_rooms() {
    let plan = plan_for(&document(&[("frontend", 3), ("backend", 3), ("devops", 2)]));
    assert_eq!(plan.room_count(), 3);
    assert_eq!(plan.pane_counts(), vec![3, 3, 2]);
    assert_eq!(plan.agent_count(), 8);
    assert_eq!(plan.windows.iter().map(|w| w.splits()).sum::<usize>(), 5);
}

#[test]
fn scenario_b_legacy_default() {
    let plan = plan("acme", &Spec::Legacy(LegacySpec::default()), Path::new("/b/acme")).unwrap();
    assert_eq!(plan.mode, PlanMode::Legacy);
    assert_eq!(plan.room_count(), 4);
    assert_eq!(plan.agent_count(), 16);

    let dirs: HashSet<PathBuf> = plan.panes().map(|(_, p)| p.working_dir.clone()).collect();
    assert_eq!(dirs.len(), 16);
    assert!(dirs.contains(Path::new("/b/acme/org-04/04worker-c")));
}

#[test]
fn scenario_c_worker_filter_selects_twelve() {
    let plan = plan("acme", &Spec::Legacy(LegacySpec::default()), Path::new("/b/acme")).unwrap();
    let selected: Vec<_> = plan
        .panes()
        .filter(|(w, p)| pane_matches(w, p, Some("worker")))
        .collect();
    assert_eq!(selected.len(), 12);
    assert!(selected.iter().all(|(_, p)| p.role != "boss"));
}

#[test]
fn plans_are_stable_and_injective_for_many_shapes() {
    let shapes: &[&[(&str, usize)]] = &[
        &[("solo", 1)],
        &[("a", 1), ("b", 7)],
        &[("x", 4), ("y", 0), ("z", 2)],
        &[("r1", 2), ("r2", 2), ("r3", 2), ("r4", 2), ("r5", 2)],
    ];
    for shape in shapes {
        let yaml = document(shape);
        let first = plan_for(&yaml);
        let second = plan_for(&yaml);
        assert_eq!(first, second, "plan for {shape:?} is not stable");

        let addresses: HashSet<_> = first.panes().map(|(_, p)| p.address).collect();
        assert_eq!(addresses.len(), first.agent_count(), "duplicate address in {shape:?}");

        for (window, w) in first.windows.iter().enumerate() {
            assert_eq!(w.index, window);
            for (pane, p) in w.panes.iter().enumerate() {
                assert_eq!((p.address.window, p.address.pane), (window, pane));
            }
        }
    }
}

#[test]
fn empty_room_still_gets_a_window() {
    let plan = plan_for(&document(&[("x", 2), ("idle", 0), ("z", 1)]));
    assert_eq!(plan.pane_counts(), vec![2, 0, 1]);
    assert_eq!(plan.windows[2].panes[0].address.window, 2);
}

#[test]
fn plan_recomputes_identically_from_stored_spec() {
    let spec = Spec::Legacy(LegacySpec::with_overrides([
        Some(OrgSpec::new("Mobile", "App")),
        None,
        None,
        Some(OrgSpec::new("QA", "Testing")),
    ]));
    let original = plan("acme", &spec, Path::new("/b/acme")).unwrap();

    let stored = serde_json::to_string(&spec.to_stored().unwrap()).unwrap();
    let reloaded = Spec::from_stored(&serde_json::from_str(&stored).unwrap()).unwrap();
    let recomputed = plan("acme", &reloaded, Path::new("/b/acme")).unwrap();

    assert_eq!(original, recomputed);
}

#[test]
fn interleaved_agents_keep_per_room_order() {
    let yaml = r#"
version: "1"
space:
  name: team
  rooms:
    - name: a
    - name: b
  agents:
    - { name: b1, room: b }
    - { name: a1, room: a }
    - { name: b2, room: b }
    - { name: a2, room: a }
"#;
    let plan = plan_for(yaml);
    let order: Vec<_> = plan.panes().map(|(_, p)| p.agent.as_str()).collect();
    assert_eq!(order, ["a1", "a2", "b1", "b2"]);
}

#[test]
fn undeclared_room_fails_before_planning() {
    let spec = Spec::Declarative(
        serde_json::from_value(serde_json::json!({
            "name": "team",
            "rooms": [{"name": "a"}],
            "agents": [{"name": "x", "room": "b"}]
        }))
        .unwrap(),
    );
    let err = plan("team", &spec, Path::new("/ws")).unwrap_err();
    assert!(matches!(err, SpecError::UnknownRoom { .. }));
}
