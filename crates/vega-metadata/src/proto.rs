use crate::{MetadataError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use vega_core::{FqName, ANY_FQ_NAME};

/// Metadata of one compiled unit: either a class or a package facade
/// (the synthetic owner of a file's top-level declarations).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtoData {
    Class(ClassProtoData),
    PackageFacade(PackageFacadeProtoData),
}

impl ProtoData {
    pub fn fq_name(&self) -> &FqName {
        match self {
            Self::Class(class) => &class.fq_name,
            Self::PackageFacade(facade) => &facade.fq_name,
        }
    }

    /// Non-private member names declared by this unit.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        let members = match self {
            Self::Class(class) => &class.members,
            Self::PackageFacade(facade) => &facade.members,
        };
        members.keys().map(String::as_str)
    }

    /// Serialize to the opaque blob form the cache stores.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(MetadataError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(MetadataError::from)
    }
}

/// Class metadata as the diff sees it: name, supertypes, modality flags,
/// non-private members keyed by signature fingerprint, and inline-constant
/// value fingerprints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassProtoData {
    pub fq_name: FqName,
    pub supertypes: BTreeSet<FqName>,
    pub is_sealed: bool,
    /// True for companion objects; the enclosing class is `fq_name.parent()`.
    pub is_companion: bool,
    /// Short name of this class's companion object, if it has one.
    pub companion_object_name: Option<String>,
    /// Member name → signature fingerprint. A fingerprint change is a member
    /// change; the fingerprint scheme is the front end's concern.
    pub members: BTreeMap<String, u64>,
    /// Inline-constant name → value fingerprint. Value changes require
    /// recompiling dependents even though no signature changed.
    pub constants: BTreeMap<String, u64>,
}

impl ClassProtoData {
    pub fn new(fq_name: impl Into<FqName>) -> Self {
        Self {
            fq_name: fq_name.into(),
            supertypes: BTreeSet::new(),
            is_sealed: false,
            is_companion: false,
            companion_object_name: None,
            members: BTreeMap::new(),
            constants: BTreeMap::new(),
        }
    }

    /// Supertypes relevant to the hierarchy caches: everything but the
    /// universal root, which every class implicitly extends.
    pub fn recorded_supertypes(&self) -> impl Iterator<Item = &FqName> {
        self.supertypes
            .iter()
            .filter(|fq| fq.as_str() != ANY_FQ_NAME)
    }
}

/// Package facade metadata: the file-level functions/properties of a package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFacadeProtoData {
    pub fq_name: FqName,
    pub members: BTreeMap<String, u64>,
    pub constants: BTreeMap<String, u64>,
}

impl PackageFacadeProtoData {
    pub fn new(fq_name: impl Into<FqName>) -> Self {
        Self {
            fq_name: fq_name.into(),
            members: BTreeMap::new(),
            constants: BTreeMap::new(),
        }
    }
}
