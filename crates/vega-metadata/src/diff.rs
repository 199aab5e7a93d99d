use crate::proto::{ClassProtoData, PackageFacadeProtoData, ProtoData};
use std::collections::{BTreeMap, BTreeSet};
use vega_core::FqName;

/// Structural difference between two rounds' metadata for the same unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtoDifference {
    /// The unit's externally visible shape changed (supertypes, modality,
    /// companion presence). Callers that reference it by name are affected.
    pub is_signature_affected: bool,
    /// The signature change also invalidates every transitive subclass.
    pub are_subclasses_affected: bool,
    /// Members added, removed, or with a changed signature fingerprint.
    pub changed_members: BTreeSet<String>,
    /// Supertypes present on exactly one side.
    pub changed_supertypes: BTreeSet<FqName>,
}

impl ProtoDifference {
    pub fn is_empty(&self) -> bool {
        !self.is_signature_affected
            && self.changed_members.is_empty()
            && self.changed_supertypes.is_empty()
    }
}

/// Diff `old` against `new`.
///
/// Both sides must be the same declaration kind; a class to package-facade
/// transition (or the reverse) is always a conservative whole-signature
/// change.
pub fn compute_difference(old: &ProtoData, new: &ProtoData) -> ProtoDifference {
    match (old, new) {
        (ProtoData::Class(old), ProtoData::Class(new)) => class_difference(old, new),
        (ProtoData::PackageFacade(old), ProtoData::PackageFacade(new)) => {
            facade_difference(old, new)
        }
        _ => ProtoDifference {
            is_signature_affected: true,
            are_subclasses_affected: true,
            ..ProtoDifference::default()
        },
    }
}

fn class_difference(old: &ClassProtoData, new: &ClassProtoData) -> ProtoDifference {
    let mut diff = ProtoDifference::default();

    diff.changed_supertypes = symmetric_difference(&old.supertypes, &new.supertypes);
    if !diff.changed_supertypes.is_empty() {
        diff.is_signature_affected = true;
        diff.are_subclasses_affected = true;
    }

    if old.is_sealed != new.is_sealed {
        diff.is_signature_affected = true;
        diff.are_subclasses_affected = true;
    }

    if old.companion_object_name != new.companion_object_name {
        diff.is_signature_affected = true;
        diff.are_subclasses_affected = true;
    }

    diff.changed_members = changed_member_names(&old.members, &new.members);
    diff
}

fn facade_difference(
    old: &PackageFacadeProtoData,
    new: &PackageFacadeProtoData,
) -> ProtoDifference {
    ProtoDifference {
        changed_members: changed_member_names(&old.members, &new.members),
        ..ProtoDifference::default()
    }
}

fn changed_member_names(
    old: &BTreeMap<String, u64>,
    new: &BTreeMap<String, u64>,
) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (name, fingerprint) in old {
        if new.get(name) != Some(fingerprint) {
            changed.insert(name.clone());
        }
    }
    for name in new.keys() {
        if !old.contains_key(name) {
            changed.insert(name.clone());
        }
    }
    changed
}

fn symmetric_difference(old: &BTreeSet<FqName>, new: &BTreeSet<FqName>) -> BTreeSet<FqName> {
    old.symmetric_difference(new).cloned().collect()
}
