//! Binding reconciliation.
//!
//! [`Items`] keeps the set of element/product bindings found under the
//! current root and reports the delta on every refresh. It only diffs sets;
//! tracking status is the reducer's business.

use std::collections::HashMap;
use std::rc::Rc;
use widget_tracking_core::element::descendants;
use widget_tracking_core::{ElementId, ElementRef};

/// A live association between a rendered element and a product
#[derive(Debug, Clone)]
pub struct Binding {
    /// Product the element represents
    pub product_id: String,
    /// The tagged element
    pub element: ElementRef,
}

impl Binding {
    /// Identity of the bound element
    #[must_use]
    pub fn element_id(&self) -> ElementId {
        self.element.id()
    }

    fn same_as(&self, other: &Self) -> bool {
        self.element_id() == other.element_id() && self.product_id == other.product_id
    }
}

/// Result of a reconciliation
#[derive(Debug, Clone, Default)]
pub struct BindingDelta {
    /// Associations that appeared since the last refresh, in document order
    pub bound: Vec<Binding>,
    /// Associations that went away
    pub unbound: Vec<Binding>,
}

impl BindingDelta {
    /// Whether nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty() && self.unbound.is_empty()
    }
}

/// The binding set of one tracker
#[derive(Debug, Clone, Default)]
pub struct Items {
    root: Option<ElementId>,
    bindings: Vec<Binding>,
    index: HashMap<ElementId, usize>,
}

impl Items {
    /// An empty binding set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile against the tree under `root`.
    ///
    /// A different root (or none) unbinds everything first. Elements that
    /// were detached or re-tagged are reported as unbound; a re-tagged
    /// element is reported bound again under its new product id.
    pub fn refresh(&mut self, root: Option<&ElementRef>) -> BindingDelta {
        let mut delta = BindingDelta::default();
        if self.root != root.map(|r| r.id()) {
            delta.unbound = self.unbind_all().unbound;
            self.root = root.map(|r| r.id());
        }
        let Some(root) = root else {
            return delta;
        };

        let current: Vec<Binding> = descendants(root)
            .into_iter()
            .filter_map(|element| {
                element.product_id().map(|product_id| Binding {
                    product_id,
                    element: Rc::clone(&element),
                })
            })
            .collect();
        let current_index: HashMap<ElementId, usize> = current
            .iter()
            .enumerate()
            .map(|(i, b)| (b.element_id(), i))
            .collect();

        for binding in &self.bindings {
            let kept = current_index
                .get(&binding.element_id())
                .and_then(|&i| current.get(i))
                .is_some_and(|b| b.same_as(binding));
            if !kept {
                delta.unbound.push(binding.clone());
            }
        }
        for binding in &current {
            let known = self
                .index
                .get(&binding.element_id())
                .and_then(|&i| self.bindings.get(i))
                .is_some_and(|b| b.same_as(binding));
            if !known {
                delta.bound.push(binding.clone());
            }
        }

        self.bindings = current;
        self.index = current_index;
        delta
    }

    /// Binding of `element`, if it is bound
    #[must_use]
    pub fn get(&self, element: ElementId) -> Option<&Binding> {
        self.index.get(&element).and_then(|&i| self.bindings.get(i))
    }

    /// Live bindings in document order
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Drop every binding and forget the root, reporting them as unbound
    pub fn unbind_all(&mut self) -> BindingDelta {
        self.root = None;
        self.index.clear();
        BindingDelta {
            bound: Vec::new(),
            unbound: std::mem::take(&mut self.bindings),
        }
    }

    /// Root the bindings were last reconciled against
    #[must_use]
    pub const fn root(&self) -> Option<ElementId> {
        self.root
    }

    /// Number of live bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
