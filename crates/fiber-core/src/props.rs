//! Property bags carried by descriptions and fibers.
//!
//! A [`Props`] bag is ordered and cheap to clone; builders copy on write.
//! How a value reaches the host depends on its variant: listeners become
//! event subscriptions, refs receive the host node, styles are flattened
//! into a declaration string and scalar values become attributes.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::Element;
use crate::hooks::RefObject;
use crate::host::HostId;

/// Key holding the value of a text description.
pub const TEXT_VALUE_KEY: &str = "nodeValue";
pub const STYLE_KEY: &str = "style";
pub const REF_KEY: &str = "ref";
pub const CHILDREN_KEY: &str = "children";

const LISTENER_PREFIX: &str = "on";

const UNITLESS_PROPERTIES: &[&str] = &[
    "flex",
    "flexGrow",
    "flexShrink",
    "fontWeight",
    "lineHeight",
    "opacity",
    "order",
    "zIndex",
    "zoom",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    pub target: HostId,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: HostId) -> Self {
        Self {
            kind: kind.into(),
            target,
        }
    }
}

/// Event listener with reference identity.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event) + 'static>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &EventHandler) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:#x})", self.addr())
    }
}

/// Event name bound by a listener key: `onClick` listens for `click`.
pub fn listener_event(key: &str) -> Option<String> {
    key.strip_prefix(LISTENER_PREFIX)
        .filter(|rest| !rest.is_empty())
        .map(|rest| rest.to_ascii_lowercase())
}

#[derive(Clone, Debug, PartialEq)]
pub enum StyleValue {
    Text(String),
    Number(f64),
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        StyleValue::Text(value.to_owned())
    }
}

impl From<String> for StyleValue {
    fn from(value: String) -> Self {
        StyleValue::Text(value)
    }
}

impl From<f64> for StyleValue {
    fn from(value: f64) -> Self {
        StyleValue::Number(value)
    }
}

impl From<i32> for StyleValue {
    fn from(value: i32) -> Self {
        StyleValue::Number(value as f64)
    }
}

impl From<u32> for StyleValue {
    fn from(value: u32) -> Self {
        StyleValue::Number(value as f64)
    }
}

/// Inline style object with camelCase property names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Style {
    declarations: IndexMap<String, StyleValue>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, property: &str, value: impl Into<StyleValue>) -> Self {
        self.declarations.insert(property.to_owned(), value.into());
        self
    }

    /// Copies every declaration of `other`, overriding existing ones.
    pub fn merge(mut self, other: &Style) -> Self {
        for (property, value) in &other.declarations {
            self.declarations.insert(property.clone(), value.clone());
        }
        self
    }

    pub fn get(&self, property: &str) -> Option<&StyleValue> {
        self.declarations.get(property)
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Flattens the style into `kebab-case: value;` declarations.
    pub fn to_declarations(&self) -> String {
        let mut out = String::new();
        for (property, value) in &self.declarations {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&kebab_case(property));
            out.push_str(": ");
            match value {
                StyleValue::Text(text) => out.push_str(text),
                StyleValue::Number(number) => {
                    out.push_str(&format_number(*number));
                    if !UNITLESS_PROPERTIES.contains(&property.as_str()) && *number != 0.0 {
                        out.push_str("px");
                    }
                }
            }
            out.push(';');
        }
        out
    }
}

fn kebab_case(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 4);
    for ch in property.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.is_finite() {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

#[derive(Clone)]
pub enum PropValue {
    Text(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Style(Rc<Style>),
    Listener(EventHandler),
    Ref(RefObject<Option<HostId>>),
    Element(Element),
    Any(Rc<dyn Any>),
}

impl PropValue {
    /// Identity comparison: scalars by value, everything else by reference.
    pub fn same(&self, other: &PropValue) -> bool {
        match (self, other) {
            (PropValue::Text(a), PropValue::Text(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => Rc::ptr_eq(a, b) || a == b,
            (PropValue::Listener(a), PropValue::Listener(b)) => a.ptr_eq(b),
            (PropValue::Ref(a), PropValue::Ref(b)) => a.ptr_eq(b),
            (PropValue::Element(a), PropValue::Element(b)) => a.ptr_eq(b),
            (PropValue::Any(a), PropValue::Any(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Serialized attribute value, `None` for values that are not attributes.
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            PropValue::Text(text) => Some(text.to_string()),
            PropValue::Int(value) => Some(value.to_string()),
            PropValue::Float(value) => Some(format_number(*value)),
            PropValue::Bool(value) => Some(value.to_string()),
            PropValue::Style(style) => Some(style.to_declarations()),
            PropValue::Listener(_)
            | PropValue::Ref(_)
            | PropValue::Element(_)
            | PropValue::Any(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(text) => write!(f, "{text:?}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Style(style) => write!(f, "Style({:?})", style.to_declarations()),
            PropValue::Listener(handler) => write!(f, "{handler:?}"),
            PropValue::Ref(_) => f.write_str("Ref"),
            PropValue::Element(element) => write!(f, "Element({})", element.label()),
            PropValue::Any(_) => f.write_str("Any"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Text(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        PropValue::Int(value as i64)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<Style> for PropValue {
    fn from(value: Style) -> Self {
        PropValue::Style(Rc::new(value))
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Listener(value)
    }
}

impl From<RefObject<Option<HostId>>> for PropValue {
    fn from(value: RefObject<Option<HostId>>) -> Self {
        PropValue::Ref(value)
    }
}

impl From<Element> for PropValue {
    fn from(value: Element) -> Self {
        PropValue::Element(value)
    }
}

/// Ordered, immutable-by-default property bag.
#[derive(Clone, Default)]
pub struct Props {
    entries: Rc<IndexMap<Rc<str>, PropValue>>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<PropValue>) {
        Rc::make_mut(&mut self.entries).insert(Rc::from(key), value.into());
    }

    /// Binds `handler` to `event` under the `on<Event>` key.
    pub fn on(self, event: &str, handler: impl Fn(&Event) + 'static) -> Self {
        let mut key = String::from(LISTENER_PREFIX);
        let mut chars = event.chars();
        if let Some(first) = chars.next() {
            key.push(first.to_ascii_uppercase());
            key.extend(chars);
        }
        self.with(&key, EventHandler::new(handler))
    }

    pub fn with_any<T: 'static>(self, key: &str, value: T) -> Self {
        self.with_value(key, PropValue::Any(Rc::new(value)))
    }

    pub fn with_value(mut self, key: &str, value: PropValue) -> Self {
        Rc::make_mut(&mut self.entries).insert(Rc::from(key), value);
        self
    }

    /// Passes a ref object down to a component created with
    /// [`Component::forward_ref`](crate::Component::forward_ref).
    pub fn forward_ref<T: 'static>(self, target: &RefObject<Option<T>>) -> Self {
        self.with_any(REF_KEY, target.clone())
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_text)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(PropValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn element(&self, key: &str) -> Option<&Element> {
        match self.get(key) {
            Some(PropValue::Element(element)) => Some(element),
            _ => None,
        }
    }

    /// Typed access to a value stored with [`Props::with_any`].
    pub fn any<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        match self.get(key) {
            Some(PropValue::Any(value)) => Rc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> + '_ {
        self.entries.iter().map(|(key, value)| (&**key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, value)| (&**key, value)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn style_flattens_to_kebab_case_declarations() {
        let style = Style::new()
            .set("backgroundColor", "red")
            .set("height", 300)
            .set("opacity", 0.5)
            .set("marginTop", 0);
        assert_eq!(
            style.to_declarations(),
            "background-color: red; height: 300px; opacity: 0.5; margin-top: 0;"
        );
    }

    #[test]
    fn style_merge_overrides_in_place() {
        let base = Style::new().set("width", 100).set("height", 100);
        let merged = base.merge(&Style::new().set("width", 101).set("color", "white"));
        assert_eq!(
            merged.to_declarations(),
            "width: 101px; height: 100px; color: white;"
        );
    }

    #[test]
    fn listener_keys_map_to_lowercase_events() {
        assert_eq!(listener_event("onClick").as_deref(), Some("click"));
        assert_eq!(listener_event("onMouseMove").as_deref(), Some("mousemove"));
        assert_eq!(listener_event("on"), None);
        assert_eq!(listener_event("id"), None);
    }

    #[test]
    fn builder_copies_on_write() {
        let base = Props::new().with("id", "a");
        let derived = base.clone().with("class", "b");
        assert_eq!(base.len(), 1);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived.text("id"), Some("a"));
    }

    #[test]
    fn on_builds_listener_key() {
        let hits = Rc::new(Cell::new(0));
        let hits_clone = Rc::clone(&hits);
        let props = Props::new().on("click", move |_| hits_clone.set(hits_clone.get() + 1));
        match props.get("onClick") {
            Some(PropValue::Listener(handler)) => handler.call(&Event::new("click", 0)),
            other => panic!("expected listener, got {other:?}"),
        }
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn identity_rules() {
        let handler = EventHandler::new(|_| {});
        assert!(PropValue::from(handler.clone()).same(&PropValue::from(handler)));
        assert!(!PropValue::from(EventHandler::new(|_| {}))
            .same(&PropValue::from(EventHandler::new(|_| {}))));
        assert!(PropValue::from("x").same(&PropValue::from(String::from("x"))));
        assert!(!PropValue::from(1).same(&PropValue::from("1")));
    }

    #[test]
    fn any_values_downcast() {
        let props = Props::new().with_any("payload", 42u32);
        assert_eq!(props.any::<u32>("payload").as_deref(), Some(&42));
        assert!(props.any::<String>("payload").is_none());
    }
}
