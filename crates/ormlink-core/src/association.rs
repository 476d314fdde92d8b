//! Association descriptors.
//!
//! An association is described once, at definition time, by a static
//! [`AssociationInfo`]. The instance layer never generates per-instance code:
//! every accessor call dispatches on the descriptor's [`Linkage`], which says
//! where the link lives in storage.

use serde::{Deserialize, Serialize};

/// How an association was declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Foreign key on the source row (many sources may share one target).
    #[default]
    HasOne,
    /// Join table between source and target.
    HasMany,
    /// Target row shares the source key (row splitting).
    ExtendsTo,
}

/// Whether an accessor yields at most one instance or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Zero or one related instance.
    One,
    /// Any number of related instances.
    Many,
}

/// A join table linking two models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTableInfo {
    /// Join table name (e.g. `"person_pets"`).
    pub table: String,
    /// Join columns referencing the source key, positionally.
    pub source_columns: Vec<String>,
    /// Join columns referencing the target key, positionally.
    pub target_columns: Vec<String>,
}

impl JoinTableInfo {
    /// Create a join-table definition.
    pub fn new(
        table: impl Into<String>,
        source_columns: Vec<String>,
        target_columns: Vec<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_columns,
            target_columns,
        }
    }

    /// The same table seen from the other side.
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            table: self.table.clone(),
            source_columns: self.target_columns.clone(),
            target_columns: self.source_columns.clone(),
        }
    }
}

/// Where the link between source and target is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linkage {
    /// Columns on the source row hold the target key.
    LocalKey {
        /// Foreign-key columns on the source, positional with the target key.
        columns: Vec<String>,
    },
    /// Columns on target rows hold the source key.
    RemoteKey {
        /// Foreign-key columns on the target, positional with the source key.
        columns: Vec<String>,
        /// Target rows exist only through this link: replacing or removing the
        /// link deletes them instead of nulling the columns.
        owned: bool,
    },
    /// A join table holds (source key, target key) pairs.
    JoinTable(JoinTableInfo),
}

/// Which synthesized accessor is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorKind {
    Get,
    Set,
    Add,
    Has,
    Remove,
}

impl AccessorKind {
    /// Every accessor kind, in naming order.
    pub const ALL: [AccessorKind; 5] = [
        AccessorKind::Get,
        AccessorKind::Set,
        AccessorKind::Add,
        AccessorKind::Has,
        AccessorKind::Remove,
    ];

    /// Method-name prefix for this accessor.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            AccessorKind::Get => "get",
            AccessorKind::Set => "set",
            AccessorKind::Add => "add",
            AccessorKind::Has => "has",
            AccessorKind::Remove => "remove",
        }
    }
}

/// Suffix of the promise-style accessor variants.
pub const ASYNC_SUFFIX: &str = "Async";

/// Synthesized accessor method names for one association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorNames {
    stem: String,
    kinds: Vec<AccessorKind>,
}

impl AccessorNames {
    /// Names for an association called `name` exposing `kinds`.
    pub fn new(name: &str, kinds: &[AccessorKind]) -> Self {
        let mut chars = name.chars();
        let stem = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Self {
            stem,
            kinds: kinds.to_vec(),
        }
    }

    /// The capitalized association name used in method names.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Callback-style method name, if this accessor is exposed.
    #[must_use]
    pub fn method(&self, kind: AccessorKind) -> Option<String> {
        self.kinds
            .contains(&kind)
            .then(|| format!("{}{}", kind.prefix(), self.stem))
    }

    /// Every exposed method name, callback and promise forms.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        self.kinds
            .iter()
            .flat_map(|kind| {
                let base = format!("{}{}", kind.prefix(), self.stem);
                let promise = format!("{base}{ASYNC_SUFFIX}");
                [base, promise]
            })
            .collect()
    }

    /// Resolve a method name to its accessor kind and whether it is the
    /// promise-style variant.
    #[must_use]
    pub fn resolve(&self, method: &str) -> Option<(AccessorKind, bool)> {
        let (base, promise) = match method.strip_suffix(ASYNC_SUFFIX) {
            Some(base) => (base, true),
            None => (method, false),
        };
        self.kinds.iter().find_map(|kind| {
            let rest = base.strip_prefix(kind.prefix())?;
            (rest == self.stem).then_some((*kind, promise))
        })
    }
}

/// Static description of one association edge, as seen from its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationInfo {
    /// Association name (e.g. `"pet"`, `"owners"`).
    pub name: String,
    /// Declared mode of the edge this descriptor belongs to.
    pub kind: AssociationKind,
    /// True when this is the back-reference registered on the target of
    /// another association.
    pub reversed: bool,
    /// Name of the paired association on the other model, if any.
    pub reverse: Option<String>,
    /// Source table.
    pub source_table: String,
    /// Target table.
    pub target_table: String,
    /// Storage representation of the link.
    pub linkage: Linkage,
    /// Single- or multi-valued.
    pub cardinality: Cardinality,
    /// `get` fails with not-found when nothing is linked.
    pub required: bool,
    /// Exposed accessor names.
    pub accessors: AccessorNames,
}

impl AssociationInfo {
    /// Create a descriptor; accessors are derived from `name` and `linkage`.
    pub fn new(
        name: impl Into<String>,
        kind: AssociationKind,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        linkage: Linkage,
    ) -> Self {
        let name = name.into();
        let cardinality = match &linkage {
            Linkage::JoinTable(_) | Linkage::RemoteKey { owned: false, .. } => Cardinality::Many,
            Linkage::LocalKey { .. } | Linkage::RemoteKey { owned: true, .. } => Cardinality::One,
        };
        let kinds: &[AccessorKind] = match cardinality {
            Cardinality::One => &[
                AccessorKind::Get,
                AccessorKind::Set,
                AccessorKind::Has,
                AccessorKind::Remove,
            ],
            Cardinality::Many => &AccessorKind::ALL,
        };
        Self {
            accessors: AccessorNames::new(&name, kinds),
            name,
            kind,
            reversed: false,
            reverse: None,
            source_table: source_table.into(),
            target_table: target_table.into(),
            linkage,
            cardinality,
            required: false,
        }
    }

    /// Mark as the back-reference side.
    #[must_use]
    pub fn reversed(mut self, value: bool) -> Self {
        self.reversed = value;
        self
    }

    /// Record the paired association name.
    #[must_use]
    pub fn reverse(mut self, name: impl Into<String>) -> Self {
        self.reverse = Some(name.into());
        self
    }

    /// Require a linked target on `get`.
    #[must_use]
    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    /// Expose only the `get` and `has` accessors.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.accessors = AccessorNames::new(&self.name, &[AccessorKind::Get, AccessorKind::Has]);
        self
    }

    /// True when `get` may return several instances.
    #[must_use]
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pet() -> AssociationInfo {
        AssociationInfo::new(
            "pet",
            AssociationKind::HasOne,
            "person",
            "pet",
            Linkage::LocalKey {
                columns: vec!["pet_id".to_string()],
            },
        )
    }

    #[test]
    fn test_local_key_is_single_valued() {
        let info = pet();
        assert_eq!(info.cardinality, Cardinality::One);
        assert_eq!(info.accessors.method(AccessorKind::Get).unwrap(), "getPet");
        assert!(info.accessors.method(AccessorKind::Add).is_none());
    }

    #[test]
    fn test_remote_key_reverse_is_many() {
        let info = AssociationInfo::new(
            "owners",
            AssociationKind::HasOne,
            "pet",
            "person",
            Linkage::RemoteKey {
                columns: vec!["pet_id".to_string()],
                owned: false,
            },
        )
        .reversed(true)
        .reverse("pet");
        assert!(info.is_many());
        assert_eq!(info.reverse.as_deref(), Some("pet"));
        assert!(info.accessors.all().contains(&"setOwnersAsync".to_string()));
    }

    #[test]
    fn test_read_only_keeps_get_and_has() {
        let info = pet().read_only();
        assert_eq!(info.accessors.resolve("getPet"), Some((AccessorKind::Get, false)));
        assert_eq!(info.accessors.resolve("hasPetAsync"), Some((AccessorKind::Has, true)));
        assert_eq!(info.accessors.resolve("setPet"), None);
        assert_eq!(info.accessors.resolve("removePet"), None);
        assert_eq!(info.accessors.all().len(), 4);
    }

    #[test]
    fn test_resolve_method_names() {
        let info = pet();
        assert_eq!(
            info.accessors.resolve("hasPet"),
            Some((AccessorKind::Has, false))
        );
        assert_eq!(
            info.accessors.resolve("removePetAsync"),
            Some((AccessorKind::Remove, true))
        );
        assert_eq!(info.accessors.resolve("addPet"), None);
        assert_eq!(info.accessors.resolve("getPets"), None);
    }

    #[test]
    fn test_join_table_flip() {
        let join = JoinTableInfo::new(
            "person_pets",
            vec!["person_id".to_string()],
            vec!["pets_id".to_string()],
        );
        let flipped = join.flipped();
        assert_eq!(flipped.source_columns, vec!["pets_id".to_string()]);
        assert_eq!(flipped.target_columns, vec!["person_id".to_string()]);
    }
}
