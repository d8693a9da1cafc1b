//! Element tree abstraction.
//!
//! The tracking core never renders anything. It only reads the element tree
//! the rendering collaborator produced: which elements exist, how they nest,
//! and which attributes they carry. Any DOM-like tree can implement
//! [`Element`].

use std::fmt;
use std::rc::Rc;

/// Attribute carrying the product identifier of a rendered item
pub const ATTR_PRODUCT_ID: &str = "data-miso-product-id";

/// Attribute on the root element carrying the response-correlating id
pub const ATTR_MISO_ID: &str = "miso-id";

/// Opaque element identity.
///
/// Two handles with the same id refer to the same element. Ids are never
/// reused for a different element within the lifetime of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Create an element id from a raw value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in a DOM-like element tree
pub trait Element: fmt::Debug {
    /// Stable identity of this element
    fn id(&self) -> ElementId;

    /// Upper-case tag name (`"A"`, `"LI"`, ...)
    fn tag_name(&self) -> String;

    /// Attribute value, if present
    fn attribute(&self, name: &str) -> Option<String>;

    /// Parent element, `None` for a detached element or the document root
    fn parent(&self) -> Option<ElementRef>;

    /// Child elements in document order
    fn children(&self) -> Vec<ElementRef>;

    /// Product id this element is tagged with
    fn product_id(&self) -> Option<String> {
        self.attribute(ATTR_PRODUCT_ID).filter(|id| !id.is_empty())
    }

    /// Whether this element is a navigational anchor with a non-empty `href`
    fn is_link(&self) -> bool {
        self.tag_name().eq_ignore_ascii_case("a")
            && self.attribute("href").is_some_and(|href| !href.is_empty())
    }
}

/// Shared handle to an element
pub type ElementRef = Rc<dyn Element>;

/// Walk from `target` up through its ancestors, returning the first `Some`
/// produced by `f`.
pub fn find_in_ancestors<T, F>(target: &ElementRef, mut f: F) -> Option<T>
where
    F: FnMut(&ElementRef) -> Option<T>,
{
    let mut current = Some(Rc::clone(target));
    while let Some(element) = current {
        if let Some(found) = f(&element) {
            return Some(found);
        }
        current = element.parent();
    }
    None
}

/// All descendants of `root` in document (pre-)order, excluding `root`
#[must_use]
pub fn descendants(root: &ElementRef) -> Vec<ElementRef> {
    let mut out = Vec::new();
    let mut stack: Vec<ElementRef> = root.children().into_iter().rev().collect();
    while let Some(element) = stack.pop() {
        stack.extend(element.children().into_iter().rev());
        out.push(element);
    }
    out
}
