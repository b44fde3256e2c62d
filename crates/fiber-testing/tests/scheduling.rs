use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use fiber_core::{EffectTag, RootConfig, StateSetter, WorkStatus};
use fiber_testing::prelude::*;

fn pair() -> Element {
    h(
        "div",
        Props::new(),
        [h("p", Props::new(), ["a"]), h("p", Props::new(), ["b"])],
    )
}

#[test]
fn slow_slice_yields_without_losing_its_place() {
    let root = TestRoot::new();
    root.render(pair());
    let cursor = root.root().next_unit();
    assert!(cursor.is_some());

    root.clock().set_step(Duration::from_millis(20));
    assert!(root.frame());
    assert_eq!(root.html(), "");
    assert_eq!(root.root().next_unit(), cursor);
    assert_eq!(root.frames().pending_frames(), 1, "slice re-armed");

    root.clock().set_step(Duration::ZERO);
    root.flush();
    assert_eq!(root.html(), "<div><p>a</p><p>b</p></div>");
    assert!(!root.root().has_pending_work());
}

#[test]
fn unit_budget_splits_the_walk_across_slices() {
    let root = TestRoot::new();
    root.render(pair());

    let status = root.perform_work(&UnitBudget::new(2)).unwrap();
    assert_eq!(status, WorkStatus::Yielded { units: 2 });
    assert!(root.root().work_in_progress().is_some());
    assert_eq!(root.html(), "", "nothing is visible before commit");

    let status = root.perform_work(&Unbounded).unwrap();
    assert_eq!(status, WorkStatus::Committed { units: 4 });
    assert_eq!(root.html(), "<div><p>a</p><p>b</p></div>");

    root.flush();
    assert_eq!(root.commit_count(), 1);
}

#[test]
fn exhausted_deadline_does_nothing() {
    let root = TestRoot::new();
    assert_eq!(root.perform_work(&Exhausted).unwrap(), WorkStatus::Idle);

    root.render(pair());
    let cursor = root.root().next_unit();
    let status = root.perform_work(&Exhausted).unwrap();
    assert_eq!(status, WorkStatus::Yielded { units: 0 });
    assert_eq!(root.root().next_unit(), cursor);
}

#[test]
fn later_render_replaces_a_pending_one() {
    let root = TestRoot::new();
    root.render(h("p", Props::new(), ["first"]));
    root.render(h("p", Props::new(), ["second"]));
    root.flush();
    assert_eq!(root.html(), "<p>second</p>");
    assert_eq!(root.commit_count(), 1);
    assert_eq!(root.frames().frame_requests(), 1);
}

#[test]
fn update_during_a_cycle_restarts_it() {
    let root = TestRoot::new();
    let setter: Rc<RefCell<Option<StateSetter<i32>>>> = Rc::default();
    let captured = Rc::clone(&setter);
    let counter = Component::new("Counter", move |hooks, _| {
        let (count, set_count) = hooks.use_state(|| 0)?;
        captured.replace(Some(set_count));
        Ok(h("b", Props::new(), [count.to_string()]))
    });
    let page = |title: &str| {
        h(
            "main",
            Props::new(),
            [h("h1", Props::new(), [title]), counter.element(Props::new())],
        )
    };

    root.mount(page("one"));
    root.render(page("two"));
    let status = root.perform_work(&UnitBudget::new(2)).unwrap();
    assert!(matches!(status, WorkStatus::Yielded { .. }));

    let set_count = setter.borrow().clone().unwrap();
    set_count.set(7);
    let status = root.perform_work(&Unbounded).unwrap();
    assert!(matches!(status, WorkStatus::Committed { .. }));
    assert_eq!(root.html(), "<main><h1>two</h1><b>7</b></main>");
    assert_eq!(root.commit_count(), 2);

    let summary = root.last_commit().unwrap();
    assert_eq!(summary.count(EffectTag::Insert), 0);
    assert_eq!(summary.count(EffectTag::Delete), 0);
}

#[test]
fn passive_effect_dispatch_schedules_a_new_cycle() {
    let root = TestRoot::new();
    let loader = Component::new("Loader", |hooks, _| {
        let (loaded, set_loaded) = hooks.use_state(|| false)?;
        hooks.use_effect(move || set_loaded.set(true), deps![])?;
        Ok(text(if loaded { "ready" } else { "loading" }))
    });

    root.render(loader.element(Props::new()));
    root.frame();
    assert_eq!(root.html(), "loading");
    assert_eq!(root.commit_count(), 1, "passive dispatch waits for the next frame");
    assert_eq!(root.frames().pending_frames(), 1);

    root.flush();
    assert_eq!(root.html(), "ready");
    assert_eq!(root.commit_count(), 2);
}

#[test]
fn frame_budget_comes_from_the_config() {
    let config = RootConfig::default().with_frame_budget(Duration::from_millis(4));
    let root = TestRoot::with_config(config);
    root.render(pair());
    root.clock().set_step(Duration::from_millis(3));
    root.frame();
    assert!(root.root().work_in_progress().is_some(), "one unit fits a 4ms slice");
    assert_eq!(root.html(), "");

    root.clock().set_step(Duration::ZERO);
    root.flush();
    assert_eq!(root.html(), "<div><p>a</p><p>b</p></div>");
}
