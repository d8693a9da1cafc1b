//! In-memory element tree.
//!
//! [`MockElement`] is a mutable DOM stand-in: elements can be created,
//! appended, removed and re-tagged between refreshes to simulate what a
//! renderer does to a live page.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use widget_tracking_core::element::{ATTR_MISO_ID, ATTR_PRODUCT_ID};
use widget_tracking_core::{Element, ElementId, ElementRef};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A mutable element in an in-memory tree
#[derive(Debug)]
pub struct MockElement {
    id: ElementId,
    tag: String,
    attributes: RefCell<BTreeMap<String, String>>,
    parent: RefCell<Weak<MockElement>>,
    children: RefCell<Vec<Rc<MockElement>>>,
}

impl MockElement {
    /// Create a detached element with a fresh id
    #[must_use]
    pub fn new(tag: &str) -> Rc<Self> {
        Rc::new(Self {
            id: ElementId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
            tag: tag.to_ascii_uppercase(),
            attributes: RefCell::new(BTreeMap::new()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    /// A widget root, optionally carrying a response id
    #[must_use]
    pub fn root(miso_id: Option<&str>) -> Rc<Self> {
        let root = Self::new("div");
        if let Some(miso_id) = miso_id {
            root.set_attribute(ATTR_MISO_ID, miso_id);
        }
        root
    }

    /// An item element tagged with `product_id`
    #[must_use]
    pub fn product(product_id: &str) -> Rc<Self> {
        let item = Self::new("li");
        item.set_attribute(ATTR_PRODUCT_ID, product_id);
        item
    }

    /// An anchor pointing at `href`
    #[must_use]
    pub fn link(href: &str) -> Rc<Self> {
        let anchor = Self::new("a");
        anchor.set_attribute("href", href);
        anchor
    }

    /// Set (or overwrite) an attribute
    pub fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .borrow_mut()
            .insert(name.to_owned(), value.to_owned());
    }

    /// Remove an attribute
    pub fn remove_attribute(&self, name: &str) {
        self.attributes.borrow_mut().remove(name);
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append(parent: &Rc<Self>, child: &Rc<Self>) {
        child.remove();
        *child.parent.borrow_mut() = Rc::downgrade(parent);
        parent.children.borrow_mut().push(Rc::clone(child));
    }

    /// Build `parent > children...` and return `parent`
    #[must_use]
    pub fn with_children(parent: Rc<Self>, children: &[Rc<Self>]) -> Rc<Self> {
        for child in children {
            Self::append(&parent, child);
        }
        parent
    }

    /// Detach this element from its parent
    pub fn remove(&self) {
        let parent = self.parent.replace(Weak::new());
        if let Some(parent) = parent.upgrade() {
            parent.children.borrow_mut().retain(|c| c.id != self.id);
        }
    }

    /// This element as a shared trait object
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> ElementRef {
        Rc::clone(self) as ElementRef
    }
}

impl Element for MockElement {
    fn id(&self) -> ElementId {
        self.id
    }

    fn tag_name(&self) -> String {
        self.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    fn parent(&self) -> Option<ElementRef> {
        self.parent
            .borrow()
            .upgrade()
            .map(|parent| parent as ElementRef)
    }

    fn children(&self) -> Vec<ElementRef> {
        self.children
            .borrow()
            .iter()
            .map(|child| Rc::clone(child) as ElementRef)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widget_tracking_core::element::descendants;

    #[test]
    fn tree_operations_keep_parent_links_consistent() {
        let root = MockElement::root(Some("abc"));
        let p1 = MockElement::product("P1");
        let a = MockElement::link("/p1");
        MockElement::append(&p1, &a);
        MockElement::append(&root, &p1);

        assert_eq!(a.parent().map(|p| p.id()), Some(p1.id()));
        assert_eq!(descendants(&root.handle()).len(), 2);
        assert!(a.is_link());
        assert_eq!(p1.product_id().as_deref(), Some("P1"));

        p1.remove();
        assert!(root.children().is_empty());
        assert!(p1.parent().is_none());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(MockElement::new("div").id(), MockElement::new("div").id());
    }
}
