//! Operation descriptors: verb, cardinality, hook stage, URL parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// REST verb. Letter codes match registration strings: C, R, U, P, D.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Create,
    Read,
    Update,
    Patch,
    Delete,
}

impl Verb {
    pub fn from_letter(c: char) -> Option<Verb> {
        match c {
            'C' => Some(Verb::Create),
            'R' => Some(Verb::Read),
            'U' => Some(Verb::Update),
            'P' => Some(Verb::Patch),
            'D' => Some(Verb::Delete),
            _ => None,
        }
    }

    /// HTTP method name for operation logging.
    pub fn http_method(&self) -> &'static str {
        match self {
            Verb::Create => "POST",
            Verb::Read => "GET",
            Verb::Update => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Verb::Read)
    }
}

/// One resource or a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    /// Arity tag for operation logging: "1" or "n".
    pub fn arity(&self) -> &'static str {
        match self {
            Cardinality::One => "1",
            Cardinality::Many => "n",
        }
    }
}

/// Point in the request lifecycle where user hooks run.
/// Letter codes match registration strings: J, B, A, T.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pre-merge, patch-only.
    Json,
    Before,
    After,
    /// Post-commit.
    Transact,
}

impl Stage {
    pub fn from_letter(c: char) -> Option<Stage> {
        match c {
            'J' => Some(Stage::Json),
            'B' => Some(Stage::Before),
            'A' => Some(Stage::After),
            'T' => Some(Stage::Transact),
            _ => None,
        }
    }
}

/// Opaque URL parameter map handed through to mappers and hooks.
pub type UrlParams = HashMap<String, String>;

/// Immutable description of one requested operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpDescriptor {
    pub verb: Verb,
    pub cardinality: Cardinality,
    pub type_name: String,
    pub url_params: UrlParams,
}

impl OpDescriptor {
    pub fn new(
        verb: Verb,
        cardinality: Cardinality,
        type_name: impl Into<String>,
        url_params: UrlParams,
    ) -> Self {
        OpDescriptor {
            verb,
            cardinality,
            type_name: type_name.into(),
            url_params,
        }
    }
}
