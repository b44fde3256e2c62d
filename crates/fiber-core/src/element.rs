//! Immutable tree descriptions.
//!
//! Descriptions are produced fresh on every render and never mutated; the
//! reconciler compares them positionally against the committed fibers.

use std::fmt;
use std::rc::Rc;

use crate::hooks::{Hooks, RefObject};
use crate::props::{Props, REF_KEY, TEXT_VALUE_KEY};
use crate::FiberError;

type RenderFn = dyn Fn(&mut Hooks<'_>, &Props) -> Result<Element, FiberError>;

/// A component function with reference identity.
///
/// Two components are the same kind only when they share the same render
/// closure, so a component must be created once and cloned, never rebuilt
/// inside another component's body.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new(
        name: &'static str,
        render: impl Fn(&mut Hooks<'_>, &Props) -> Result<Element, FiberError> + 'static,
    ) -> Self {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    /// Component whose render receives the ref object passed through
    /// [`Props::forward_ref`], or `None` when the parent did not pass one.
    pub fn forward_ref<T: 'static>(
        name: &'static str,
        render: impl Fn(&mut Hooks<'_>, &Props, Option<&RefObject<Option<T>>>) -> Result<Element, FiberError>
            + 'static,
    ) -> Self {
        Self::new(name, move |hooks, props| {
            let target = props.any::<RefObject<Option<T>>>(REF_KEY);
            render(hooks, props, target.as_deref())
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn same(&self, other: &Component) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.render), Rc::as_ptr(&other.render))
    }

    pub(crate) fn render(&self, hooks: &mut Hooks<'_>, props: &Props) -> Result<Element, FiberError> {
        (self.render)(hooks, props)
    }

    /// Description instantiating this component.
    pub fn element(&self, props: Props) -> Element {
        Element::component(self, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

#[derive(Clone, Debug)]
pub enum ElementKind {
    Host(Rc<str>),
    Text,
    Component(Component),
}

impl ElementKind {
    pub fn same(&self, other: &ElementKind) -> bool {
        match (self, other) {
            (ElementKind::Host(a), ElementKind::Host(b)) => a == b,
            (ElementKind::Text, ElementKind::Text) => true,
            (ElementKind::Component(a), ElementKind::Component(b)) => a.same(b),
            _ => false,
        }
    }
}

struct ElementInner {
    kind: ElementKind,
    props: Props,
    children: Rc<[Element]>,
}

/// One node of a description tree. Cloning is cheap.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

impl Element {
    pub fn host(tag: &str, props: Props, children: impl IntoIterator<Item = Element>) -> Self {
        Self::from_parts(ElementKind::Host(Rc::from(tag)), props, children.into_iter().collect())
    }

    pub fn text(value: impl Into<String>) -> Self {
        let props = Props::new().with(TEXT_VALUE_KEY, value.into());
        Self::from_parts(ElementKind::Text, props, Rc::from([]))
    }

    pub fn component(component: &Component, props: Props) -> Self {
        Self::from_parts(ElementKind::Component(component.clone()), props, Rc::from([]))
    }

    fn from_parts(kind: ElementKind, props: Props, children: Rc<[Element]>) -> Self {
        Self {
            inner: Rc::new(ElementInner {
                kind,
                props,
                children,
            }),
        }
    }

    pub fn kind(&self) -> &ElementKind {
        &self.inner.kind
    }

    pub fn props(&self) -> &Props {
        &self.inner.props
    }

    pub fn children(&self) -> &Rc<[Element]> {
        &self.inner.children
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Short human-readable label used in logs and commit summaries.
    pub fn label(&self) -> String {
        match self.kind() {
            ElementKind::Host(tag) => tag.to_string(),
            ElementKind::Text => format!("{:?}", self.props().text(TEXT_VALUE_KEY).unwrap_or("")),
            ElementKind::Component(component) => component.name().to_owned(),
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Element");
        debug.field("kind", self.kind()).field("props", self.props());
        if !self.children().is_empty() {
            debug.field("children", &self.children());
        }
        debug.finish()
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::text(value)
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::text(value)
    }
}

/// Builds a host description; string children become text descriptions.
pub fn h<C, I>(tag: &str, props: Props, children: I) -> Element
where
    I: IntoIterator<Item = C>,
    C: Into<Element>,
{
    Element::host(tag, props, children.into_iter().map(Into::into))
}

pub fn text(value: impl Into<String>) -> Element {
    Element::text(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_become_text_children() {
        let tree = h("div", Props::new(), ["hello", "world"]);
        assert_eq!(tree.children().len(), 2);
        assert!(matches!(tree.children()[0].kind(), ElementKind::Text));
        assert_eq!(tree.children()[1].props().text(TEXT_VALUE_KEY), Some("world"));
    }

    #[test]
    fn component_identity_is_by_closure() {
        let a = Component::new("A", |_, _| Ok(text("a")));
        let b = Component::new("A", |_, _| Ok(text("a")));
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
        assert!(a.element(Props::new()).kind().same(&ElementKind::Component(a.clone())));
    }

    #[test]
    fn labels() {
        assert_eq!(h::<Element, _>("ul", Props::new(), []).label(), "ul");
        assert_eq!(text("x").label(), "\"x\"");
        let c = Component::new("Counter", |_, _| Ok(text("")));
        assert_eq!(c.element(Props::new()).label(), "Counter");
    }
}
