use std::time::Duration;

use fiber_core::{
    deps, h, text, Cleanup, Component, Context, Element, Event, HostId, MemoryHost, Props,
    RefObject, Root, RootConfig, Style,
};
use fiber_runtime_std::StdRuntime;

const MAX_FRAMES: usize = 120;

#[derive(Clone, Debug)]
struct Theme {
    color: String,
}

/// Handle the input component exposes to its parent.
#[derive(Clone)]
struct InputHandle {
    node: RefObject<Option<HostId>>,
}

impl InputHandle {
    fn focus(&self) {
        match self.node.get() {
            Some(node) => log::info!("focus requested for input node {node}"),
            None => log::warn!("focus requested while the input is unmounted"),
        }
    }
}

fn todo(theme: Context<Theme>) -> Component {
    Component::new("Todo", move |hooks, props| {
        let (num, set_num) = hooks.use_state(|| 0)?;
        hooks.use_layout_effect(
            move || {
                log::info!("todo layout effect started");
                set_num.update(|n| n + 3);
                Cleanup::new(|| log::info!("todo layout effect torn down"))
            },
            deps![],
        )?;
        let theme = hooks.use_context(&theme)?;
        let style = Style::new()
            .set("backgroundColor", theme.color.as_str())
            .set("color", "white")
            .set("height", 300)
            .set("width", 399);
        let outer = props.int("num").unwrap_or_default();
        Ok(h(
            "div",
            Props::new()
                .with("id", props.text("id").unwrap_or("todo"))
                .with("style", style),
            [format!("TODO {num} {outer}")],
        ))
    })
}

fn fancy_input() -> Component {
    Component::forward_ref::<InputHandle>("FancyInput", |hooks, _, target| {
        let node = hooks.use_ref(|| None::<HostId>)?;
        let handle = InputHandle { node: node.clone() };
        hooks.use_imperative_handle(target, move || handle, None)?;
        let style = Style::new()
            .set("width", 200)
            .set("height", 40)
            .set("backgroundColor", "grey");
        Ok(h(
            "input",
            Props::new().with("ref", node).with("style", style),
            Vec::<Element>::new(),
        ))
    })
}

fn app() -> Component {
    let theme = Context::new("Theme");
    let todo = todo(theme.clone());
    let input = fancy_input();

    Component::new("App", move |hooks, _| {
        let (num, set_num) = hooks.use_state(|| 0_i64)?;
        let (num2, set_num2) = hooks.use_state(|| 0_i64)?;
        let (size, set_size) = hooks.use_state(|| (100, 100))?;
        let (color, set_color) = hooks.use_state(|| "yellow".to_owned())?;
        let memorized = hooks.use_memo(|| num2, deps![num2])?;
        let report = hooks.use_callback(
            move || log::info!("memoized callback captured num = {num}"),
            deps![num2],
        )?;
        let handle = hooks.use_ref(|| None::<InputHandle>)?;

        let increment = {
            let set_num = set_num.clone();
            let set_size = set_size.clone();
            let set_color = set_color.clone();
            let handle = handle.clone();
            move |_: &Event| {
                set_num.update(|n| n + 1);
                set_size.set((size.0 + 1, size.1 + 1));
                if let Some(handle) = handle.get() {
                    handle.focus();
                }
                report();
                set_color.set("green".to_owned());
            }
        };
        let add = move |_: &Event| {
            set_num2.set(num + num2);
            set_color.set("blue".to_owned());
        };

        let animation = Style::new()
            .set("width", size.0)
            .set("height", size.1)
            .set("backgroundColor", "red");
        let mut children = vec![
            h("h2", Props::new(), [format!("memorizedValue:{memorized}")]),
            h(
                "button",
                Props::new().with("id", "button1").on("click", increment),
                ["+1"],
            ),
            h(
                "button",
                Props::new().with("id", "button2").on("click", add),
                ["add2"],
            ),
            h("div", Props::new().with("id", "A1"), ["AAAA"]),
            h(
                "div",
                Props::new().with("id", "Link1"),
                [
                    h("a", Props::new().with("href", "www.example.com"), [num.to_string()]),
                    text(" ---------- "),
                    h("a", Props::new().with("href", "www.example.com"), [num2.to_string()]),
                ],
            ),
            h(
                "div",
                Props::new().with("id", "Animation1").with("style", animation),
                Vec::<Element>::new(),
            ),
            input.element(Props::new().with("id", "TODO2").forward_ref(&handle)),
        ];
        if num % 5 != 1 {
            children.push(todo.element(Props::new().with("id", "Todo1").with("num", num)));
        }
        children.push(h("div", Props::new().with("id", "NUM"), [num.to_string()]));

        let page = h("div", Props::new().with("class", "App"), children);
        Ok(theme.provider(Theme { color }, page))
    })
}

fn click(root: &Root<MemoryHost>, runtime: &StdRuntime, id: &str) {
    let container = root.container();
    let Some(node) = root.with_host(|host| host.find(container, "id", id)) else {
        log::warn!("no element with id {id}");
        return;
    };
    let handlers = root.with_host(|host| host.listeners(node, "click"));
    let event = Event::new("click", node);
    for handler in &handlers {
        handler.call(&event);
    }
    runtime.run_until_idle(MAX_FRAMES);
    if !root.has_pending_work() {
        root.with_host_mut(MemoryHost::reclaim_detached);
    }
}

fn print(root: &Root<MemoryHost>, caption: &str) {
    if let Some(err) = root.take_error() {
        eprintln!("render failed: {err}");
    }
    let container = root.container();
    println!("--- {caption} (commit #{}) ---", root.commit_count());
    println!("{}", root.with_host(|host| host.inner_html(container)));
}

fn main() {
    env_logger::init();

    println!("=== Fiber-RS Headless Demo ===");
    println!("Renders into an in-memory host and simulates button clicks:");
    println!("  - layout effect updating state during commit");
    println!("  - context, memo, callback and imperative handles");
    println!("  - conditional subtree unmounting with effect teardown");

    let runtime = StdRuntime::with_frame_interval(Duration::from_millis(1));
    let mut host = MemoryHost::new();
    let container = host.create_container("root");
    let root = Root::with_config(
        host,
        container,
        runtime.frame_scheduler(),
        runtime.clock(),
        RootConfig::default().with_label("demo"),
    );

    root.render(app().element(Props::new()));
    runtime.run_until_idle(MAX_FRAMES);
    print(&root, "mounted");

    click(&root, &runtime, "button1");
    print(&root, "after +1 (Todo unmounted)");

    click(&root, &runtime, "button1");
    print(&root, "after +1 (Todo mounted again)");

    click(&root, &runtime, "button2");
    print(&root, "after add2");

    let summary = root.last_commit().map(|summary| summary.len()).unwrap_or_default();
    log::info!("last commit applied {summary} effects");
}
