use std::collections::BTreeSet;
use vega_core::FqName;
use vega_metadata::{compute_difference, ProtoData};

/// One semantic difference between two compilation rounds, immutable once
/// emitted. Produced only by [`ChangesCollector`], consumed only by change
/// propagation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeInfo {
    /// Members that existed in the old round and are gone in the new one.
    Removed {
        fq_name: FqName,
        names: BTreeSet<String>,
    },
    /// Members whose declaration (or inline value) changed.
    MembersChanged {
        fq_name: FqName,
        names: BTreeSet<String>,
    },
    /// The declaration's externally visible shape changed.
    SignatureChanged {
        fq_name: FqName,
        are_subclasses_affected: bool,
    },
    /// The declaration's supertype list changed; `parents` holds the
    /// supertypes present on exactly one side.
    ParentsChanged {
        fq_name: FqName,
        parents: BTreeSet<FqName>,
    },
}

/// Accumulates [`ChangeInfo`] facts over a compilation round.
#[derive(Debug, Default)]
pub struct ChangesCollector {
    changes: Vec<ChangeInfo>,
}

impl ChangesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> &[ChangeInfo] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<ChangeInfo> {
        self.changes
    }

    pub fn collect_signature_changed(&mut self, fq_name: FqName, are_subclasses_affected: bool) {
        self.changes.push(ChangeInfo::SignatureChanged {
            fq_name,
            are_subclasses_affected,
        });
    }

    /// Compare a unit's metadata across rounds and record the differences.
    ///
    /// Exactly one of `old`/`new` may be absent: absent `old` is a newly added
    /// unit, absent `new` a removed one. Both absent is a front-end bug.
    ///
    /// `collect_all_members_for_new_class` additionally records every member
    /// of a newly added unit as changed, which a caller uses when the new unit
    /// may shadow existing resolutions.
    pub fn collect_proto_changes(
        &mut self,
        old: Option<&ProtoData>,
        new: Option<&ProtoData>,
        collect_all_members_for_new_class: bool,
    ) {
        match (old, new) {
            (None, None) => panic!("collect_proto_changes called with neither old nor new data"),
            (None, Some(new)) => {
                self.collect_signature_changed(new.fq_name().clone(), false);
                if collect_all_members_for_new_class {
                    let names: BTreeSet<String> =
                        new.member_names().map(str::to_string).collect();
                    if !names.is_empty() {
                        self.collect_members_changed(new, names);
                    }
                }
            }
            (Some(old), None) => {
                let names: BTreeSet<String> = old.member_names().map(str::to_string).collect();
                if !names.is_empty() {
                    self.changes.push(ChangeInfo::Removed {
                        fq_name: old.fq_name().clone(),
                        names,
                    });
                }
                self.collect_signature_changed(old.fq_name().clone(), true);
            }
            (Some(old), Some(new)) => {
                let diff = compute_difference(old, new);

                if !diff.changed_members.is_empty() {
                    self.collect_members_changed(new, diff.changed_members);
                }
                if diff.is_signature_affected {
                    self.collect_signature_changed(
                        new.fq_name().clone(),
                        diff.are_subclasses_affected,
                    );
                }
                if !diff.changed_supertypes.is_empty() {
                    self.changes.push(ChangeInfo::ParentsChanged {
                        fq_name: new.fq_name().clone(),
                        parents: diff.changed_supertypes,
                    });
                }

                self.collect_changed_constants(old, new);
            }
        }
    }

    /// Record a member change when a value-level fingerprint differs even
    /// though the declared signature did not (e.g. an inline constant).
    pub fn collect_member_if_value_changed<T: PartialEq>(
        &mut self,
        scope: &FqName,
        name: &str,
        old: Option<&T>,
        new: Option<&T>,
    ) {
        if old != new {
            self.changes.push(ChangeInfo::MembersChanged {
                fq_name: scope.clone(),
                names: BTreeSet::from([name.to_string()]),
            });
        }
    }

    /// Member changes of a companion object resolve through the enclosing
    /// class's name too, so they are recorded against both scopes: the
    /// companion's own fqName with the member names, and the enclosing class
    /// with the companion's short name.
    fn collect_members_changed(&mut self, newest: &ProtoData, names: BTreeSet<String>) {
        let fq_name = newest.fq_name().clone();

        if let ProtoData::Class(class) = newest {
            if class.is_companion {
                if let Some(enclosing) = fq_name.parent() {
                    self.changes.push(ChangeInfo::MembersChanged {
                        fq_name: enclosing,
                        names: BTreeSet::from([fq_name.short_name().to_string()]),
                    });
                }
            }
        }

        self.changes.push(ChangeInfo::MembersChanged { fq_name, names });
    }

    fn collect_changed_constants(&mut self, old: &ProtoData, new: &ProtoData) {
        let (old_constants, new_constants) = match (old, new) {
            (ProtoData::Class(old), ProtoData::Class(new)) => (&old.constants, &new.constants),
            (ProtoData::PackageFacade(old), ProtoData::PackageFacade(new)) => {
                (&old.constants, &new.constants)
            }
            _ => return,
        };

        let scope = new.fq_name().clone();
        let names: BTreeSet<&String> = old_constants.keys().chain(new_constants.keys()).collect();
        for name in names {
            self.collect_member_if_value_changed(
                &scope,
                name,
                old_constants.get(name),
                new_constants.get(name),
            );
        }
    }
}
