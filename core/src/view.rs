//! View state reported by the rendering collaborator.

use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data roles a widget can render and track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Product listing
    Products,
    /// Search results
    Results,
    /// Generic items
    Items,
    /// Category suggestions
    Categories,
    /// Attribute suggestions
    Attributes,
    /// Asked question
    Question,
    /// Generated answer
    Answer,
    /// Answer sources
    Sources,
    /// Related resources
    RelatedResources,
    /// Query suggestions
    QuerySuggestions,
    /// Related questions
    RelatedQuestions,
    /// Affiliation placements
    Affiliation,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Results => "results",
            Self::Items => "items",
            Self::Categories => "categories",
            Self::Attributes => "attributes",
            Self::Question => "question",
            Self::Answer => "answer",
            Self::Sources => "sources",
            Self::RelatedResources => "related_resources",
            Self::QuerySuggestions => "query_suggestions",
            Self::RelatedQuestions => "related_questions",
            Self::Affiliation => "affiliation",
        }
    }

    /// Response property reported in interaction context.
    ///
    /// Search results are reported as `products`.
    #[must_use]
    pub const fn res_prop(self) -> &'static str {
        match self {
            Self::Results => "products",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering status of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// Nothing requested yet
    #[default]
    Initial,
    /// Waiting for data
    Loading,
    /// Rendering failed
    Erroneous,
    /// Rendered and attached
    Ready,
}

/// Metadata attached to a view update
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewMeta {
    /// Response-correlating id of the API response behind the view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miso_id: Option<String>,
}

/// State of one role's view, as published on the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    /// Rendering status
    pub status: ViewStatus,
    /// Session the view was rendered for
    pub session: Session,
    /// Optional response metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ViewMeta>,
}

impl ViewState {
    /// A ready view for `session`
    #[must_use]
    pub const fn ready(session: Session) -> Self {
        Self {
            status: ViewStatus::Ready,
            session,
            meta: None,
        }
    }

    /// Attach a response id
    #[must_use]
    pub fn with_miso_id(mut self, miso_id: impl Into<String>) -> Self {
        self.meta = Some(ViewMeta {
            miso_id: Some(miso_id.into()),
        });
        self
    }

    /// Whether the view reported `ready`
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == ViewStatus::Ready
    }

    /// Response id from the view metadata
    #[must_use]
    pub fn miso_id(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.miso_id.as_deref())
    }
}
