//! Core shared types for Vega.
//!
//! This crate is intentionally small: the identifier and lookup-key types that
//! every other Vega crate speaks, and nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Single source of truth for the Vega version persisted caches are gated on.
pub const VEGA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fully-qualified name of the universal root supertype.
///
/// Every class implicitly extends it, so recording it in the subtype/supertype
/// adjacency would make every hierarchy query return the whole program.
pub const ANY_FQ_NAME: &str = "kotlin.Any";

/// Special member name invalidated whenever a class's member set changes.
///
/// Whether a functional interface is usable for SAM conversion depends on its
/// full member set, so SAM-conversion call sites record a lookup under this
/// name rather than under any concrete member.
pub const SAM_LOOKUP_NAME: &str = "<SAM-CONSTRUCTOR>";

/// A dot-separated fully-qualified declaration name.
///
/// The empty string is the root package.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FqName(String);

impl FqName {
    pub const ROOT: FqName = FqName(String::new());

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The name one level up, or `None` for the root package.
    pub fn parent(&self) -> Option<FqName> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('.') {
            Some(dot) => Some(FqName(self.0[..dot].to_string())),
            None => Some(FqName::ROOT),
        }
    }

    /// The last segment of the name.
    pub fn short_name(&self) -> &str {
        match self.0.rfind('.') {
            Some(dot) => &self.0[dot + 1..],
            None => &self.0,
        }
    }

    /// `self` with `segment` appended.
    pub fn child(&self, segment: &str) -> FqName {
        if self.is_root() {
            FqName(segment.to_string())
        } else {
            FqName(format!("{}.{segment}", self.0))
        }
    }
}

impl fmt::Display for FqName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl fmt::Debug for FqName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<&str> for FqName {
    fn from(value: &str) -> Self {
        FqName::new(value)
    }
}

/// Kind of scope a lookup was resolved in.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    #[default]
    Package,
    Classifier,
}

/// Key of the lookup map: which symbol, in which scope.
///
/// Ordered by scope first so dumps and iteration group all of a scope's
/// symbols together deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupSymbolKey {
    pub scope: FqName,
    pub name: String,
}

impl LookupSymbolKey {
    pub fn new(name: impl Into<String>, scope: impl Into<FqName>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl Ord for LookupSymbolKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.scope
            .cmp(&other.scope)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for LookupSymbolKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl From<String> for FqName {
    fn from(value: String) -> Self {
        FqName(value)
    }
}

/// Small integer surrogate for a file path inside the lookup storage.
///
/// Ids are assigned monotonically and never reused within a storage's
/// lifetime (short of a full `force_gc` rebuild).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FileId(pub u32);

impl FileId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// A source position attached to a recorded lookup, (line, column), 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}
