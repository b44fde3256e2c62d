use std::cell::RefCell;
use std::rc::Rc;

use fiber_core::{EffectTag, HostOp, StateSetter, Style};
use fiber_testing::prelude::*;

fn list(items: &[&str]) -> Element {
    h(
        "ul",
        Props::new().with("id", "list"),
        items.iter().map(|item| h("li", Props::new(), [*item])),
    )
}

#[test]
fn rendering_the_same_description_twice_touches_no_structure() {
    let root = TestRoot::new();
    root.mount(list(&["a", "b"]));
    root.take_ops();

    root.mount(list(&["a", "b"]));
    let summary = root.last_commit().unwrap();
    assert_eq!(summary.count(EffectTag::Insert), 0);
    assert_eq!(summary.count(EffectTag::Delete), 0);
    assert!(summary.count(EffectTag::Update) > 0);
    assert!(root.take_ops().is_empty(), "no host mutation expected");
    assert_eq!(root.html(), r#"<ul id="list"><li>a</li><li>b</li></ul>"#);
}

#[test]
fn positional_reuse_keeps_host_nodes() {
    let root = TestRoot::new();
    root.mount(list(&["a", "b"]));
    let (ul, items) = root.with_host(|host| {
        let ul = host.find(root.container(), "id", "list").unwrap();
        (ul, host.children(ul).to_vec())
    });

    root.mount(list(&["x", "b", "c"]));
    root.with_host(|host| {
        assert_eq!(host.children(ul)[..2], items[..]);
        assert_eq!(host.children(ul).len(), 3);
    });
    assert_eq!(root.html(), r#"<ul id="list"><li>x</li><li>b</li><li>c</li></ul>"#);
}

#[test]
fn changed_tag_replaces_the_node() {
    let root = TestRoot::new();
    root.mount(h("div", Props::new(), ["x"]));
    root.mount(h("span", Props::new(), ["x"]));

    let summary = root.last_commit().unwrap();
    assert_eq!(summary.labels(EffectTag::Delete), ["div"]);
    assert_eq!(summary.labels(EffectTag::Insert), ["\"x\"", "span"]);
    assert_eq!(root.html(), "<span>x</span>");
}

#[test]
fn kind_change_retires_the_remaining_old_siblings() {
    let root = TestRoot::new();
    let pair = |first: &str| {
        h(
            "div",
            Props::new(),
            [h(first, Props::new(), ["1"]), h("b", Props::new(), ["2"])],
        )
    };
    root.mount(pair("a"));
    root.mount(pair("i"));

    let summary = root.last_commit().unwrap();
    assert_eq!(summary.labels(EffectTag::Delete), ["a", "b"]);
    assert_eq!(root.html(), "<div><i>1</i><b>2</b></div>");
}

#[test]
fn shrinking_list_removes_trailing_items() {
    let root = TestRoot::new();
    root.mount(list(&["a", "b", "c"]));
    root.mount(list(&["a"]));
    assert_eq!(root.last_commit().unwrap().labels(EffectTag::Delete), ["li", "li"]);
    assert_eq!(root.html(), r#"<ul id="list"><li>a</li></ul>"#);
}

#[test]
fn effect_chain_is_post_order() {
    let root = TestRoot::new();
    let leaf = |tag| h(tag, Props::new(), Vec::<Element>::new());
    root.mount(h("a", Props::new(), [leaf("b"), leaf("c")]));

    let summary = root.last_commit().unwrap();
    let labels: Vec<_> = summary.entries().iter().map(|entry| entry.label.as_str()).collect();
    assert_eq!(labels, ["b", "c", "a"]);
}

#[test]
fn unchanged_text_is_left_in_place() {
    let root = TestRoot::new();
    root.mount(h("p", Props::new(), ["same"]));
    root.take_ops();
    root.mount(h("p", Props::new(), ["same"]));
    assert!(root.take_ops().is_empty());

    root.mount(h("p", Props::new(), ["changed"]));
    let ops = root.take_ops();
    assert!(ops.iter().any(|op| matches!(op, HostOp::ReplaceChild { .. })));
    assert_eq!(root.html(), "<p>changed</p>");
}

#[test]
fn attributes_and_styles_follow_the_description() {
    let root = TestRoot::new();
    let style = Style::new().set("marginTop", 8).set("opacity", 0.5);
    let props = Props::new().with("class", "box").with("style", style);
    root.mount(h("div", props, Vec::<Element>::new()));
    assert_eq!(
        root.html(),
        r#"<div class="box" style="margin-top: 8px; opacity: 0.5;"></div>"#
    );

    root.mount(h("div", Props::new().with("title", "t"), Vec::<Element>::new()));
    assert_eq!(root.html(), r#"<div title="t"></div>"#);
}

#[test]
fn listeners_are_swapped_not_stacked() {
    let root = TestRoot::new();
    let hits = Rc::new(RefCell::new(Vec::new()));
    let button = |tag: &'static str| {
        let hits = Rc::clone(&hits);
        h(
            "button",
            Props::new().with("id", "go").on("click", move |_| hits.borrow_mut().push(tag)),
            ["go"],
        )
    };

    root.mount(button("first"));
    root.mount(button("second"));
    let node = root.node("go");
    assert_eq!(root.dispatch(node, "click"), 1);
    assert_eq!(*hits.borrow(), ["second"]);
}

#[test]
fn component_output_is_reconciled_against_its_previous_output() {
    let root = TestRoot::new();
    let setter: Rc<RefCell<Option<StateSetter<bool>>>> = Rc::default();
    let captured = Rc::clone(&setter);
    let toggle = Component::new("Toggle", move |hooks, _| {
        let (on, set_on) = hooks.use_state(|| false)?;
        captured.replace(Some(set_on));
        Ok(if on {
            h("b", Props::new(), ["on"])
        } else {
            h("i", Props::new(), ["off"])
        })
    });

    root.mount(h("div", Props::new(), [toggle.element(Props::new())]));
    assert_eq!(root.html(), "<div><i>off</i></div>");

    setter.borrow().clone().unwrap().set(true);
    root.flush();
    assert_eq!(root.html(), "<div><b>on</b></div>");
    assert_eq!(root.last_commit().unwrap().labels(EffectTag::Delete), ["i"]);
}

#[test]
fn attribute_replaced_by_a_listener_leaves_the_node() {
    let root = TestRoot::new();
    root.mount(h(
        "button",
        Props::new().with("id", "b").with("onClick", "legacy"),
        ["x"],
    ));
    assert_eq!(root.html(), r#"<button id="b" onClick="legacy">x</button>"#);

    let hits = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&hits);
    root.mount(h(
        "button",
        Props::new()
            .with("id", "b")
            .on("click", move |_| *counter.borrow_mut() += 1),
        ["x"],
    ));
    assert_eq!(root.html(), r#"<button id="b">x</button>"#);
    assert_eq!(root.dispatch(root.node("b"), "click"), 1);
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn inserted_nodes_are_appended_after_existing_siblings() {
    let root = TestRoot::new();
    let setter: Rc<RefCell<Option<StateSetter<bool>>>> = Rc::default();
    let captured = Rc::clone(&setter);
    let toggle = Component::new("Toggle", move |hooks, _| {
        let (on, set_on) = hooks.use_state(|| false)?;
        captured.replace(Some(set_on));
        Ok(if on {
            h("b", Props::new(), ["on"])
        } else {
            h("i", Props::new(), ["off"])
        })
    });
    let page = || {
        h(
            "div",
            Props::new(),
            [toggle.element(Props::new()), h("span", Props::new(), ["tail"])],
        )
    };

    root.mount(page());
    assert_eq!(root.html(), "<div><i>off</i><span>tail</span></div>");

    setter.borrow().clone().unwrap().set(true);
    root.flush();
    // Positional diffing has no insert-before: the replacement lands last.
    assert_eq!(root.html(), "<div><span>tail</span><b>on</b></div>");
    assert_eq!(root.last_commit().unwrap().labels(EffectTag::Insert), ["\"on\"", "b"]);
}

#[test]
fn replaced_nodes_can_be_reclaimed_between_cycles() {
    let root = TestRoot::new();
    root.mount(h("p", Props::new().with("id", "p"), ["one"]));
    let live = root.with_host(|host| host.len());

    root.mount(h("p", Props::new().with("id", "p"), ["two"]));
    assert_eq!(root.with_host(|host| host.len()), live + 1, "old text stays detached");
    assert_eq!(root.root().with_host_mut(|host| host.reclaim_detached()), 1);
    assert_eq!(root.with_host(|host| host.len()), live);

    root.mount(h("p", Props::new().with("id", "p"), ["three"]));
    assert_eq!(root.html(), r#"<p id="p">three</p>"#);
    assert_eq!(root.root().with_host_mut(|host| host.reclaim_detached()), 1);
}
