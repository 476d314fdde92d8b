//! Accessor dispatch.
//!
//! One function per accessor kind, each parameterized by the association
//! descriptor. Instance state (foreign-key values, caches, status) is only
//! touched after every driver call of the operation succeeded.

use std::collections::HashSet;

use ormlink_core::{
    Cx, Error, Linkage, Outcome, Result, Row, ValidationErrorKind, Value, hash_key, try_ok,
    try_outcome,
};
use ormlink_query::{Filter, Join, Operation, Select};

use super::Association;
use crate::conditions::{Conditions, resolve};
use crate::hooks::HookEvent;
use crate::instance::{Instance, InstanceStatus};
use crate::model::Model;

/// Reject instances of the wrong model.
fn check_targets(association: &Association, target: &Model, targets: &[Instance]) -> Result<()> {
    for instance in targets {
        if instance.model() != target {
            return Err(Error::validation(
                &association.info.name,
                ValidationErrorKind::Type,
                format!(
                    "expected {} instance, got {}",
                    target.name(),
                    instance.model().name()
                ),
            ));
        }
    }
    Ok(())
}

/// Drop repeated handles and instances sharing a stored key.
fn distinct(targets: Vec<Instance>) -> Vec<Instance> {
    let mut seen = HashSet::new();
    let mut out: Vec<Instance> = Vec::with_capacity(targets.len());
    for instance in targets {
        let fresh = match instance.key() {
            Some(key) => seen.insert(hash_key(&key)),
            None => !out.iter().any(|o| o.ptr_eq(&instance)),
        };
        if fresh {
            out.push(instance);
        }
    }
    out
}

/// Keys of saved targets; `None` when any target is unsaved or removed.
fn saved_keys(targets: &[Instance]) -> Option<Vec<Vec<Value>>> {
    targets
        .iter()
        .map(|t| match t.status() {
            InstanceStatus::Persistent => t.key(),
            InstanceStatus::New | InstanceStatus::Detached => None,
        })
        .collect()
}

fn columns_row(columns: &[String], values: Vec<Value>) -> Row {
    columns.iter().cloned().zip(values).collect()
}

fn null_row(columns: &[String]) -> Row {
    columns.iter().map(|c| (c.clone(), Value::Null)).collect()
}

fn conjunction(mut left: Filter, right: Filter) -> Filter {
    left.extend(right);
    left
}

/// Foreign-key values stored on the source, if all set.
fn local_key(source: &Instance, columns: &[String]) -> Option<Vec<Value>> {
    let values = source.row().values_for(columns);
    (!values.iter().any(Value::is_null)).then_some(values)
}

fn same_key(left: &[Value], right: &[Value]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(a, b)| a.loose_eq(b))
}

/// Key of a stored source; `None` while unsaved or after removal.
fn stored_key(source: &Instance) -> Option<Vec<Value>> {
    match source.status() {
        InstanceStatus::Persistent => source.key(),
        InstanceStatus::New | InstanceStatus::Detached => None,
    }
}

/// Save unsaved targets so they have keys to link.
async fn ensure_saved(cx: &Cx, targets: &[Instance]) -> Outcome<(), Error> {
    for target in targets {
        if target.is_new() {
            try_outcome!(target.save(cx).await);
        }
    }
    Outcome::Ok(())
}

/// Number of links, or of `keys` that are linked when `keys` is non-empty.
async fn count_links(
    source: &Instance,
    association: &Association,
    target: &Model,
    cx: &Cx,
    keys: &[Vec<Value>],
) -> Outcome<u64, Error> {
    let ctx = source.model().ctx();
    match &association.info.linkage {
        Linkage::LocalKey { columns } => {
            let Some(fk) = local_key(source, columns) else {
                return Outcome::Ok(0);
            };
            let keyed = keys.is_empty()
                || keys
                    .iter()
                    .any(|k| k.iter().zip(&fk).all(|(a, b)| a.loose_eq(b)));
            if !keyed {
                return Outcome::Ok(0);
            }
            let select = Select::from(target.table()).filter(target.key_filter(&[fk]));
            ctx.count(cx, select).await
        }
        Linkage::RemoteKey { columns, .. } => {
            let Some(sk) = stored_key(source) else {
                return Outcome::Ok(0);
            };
            let mut filter = Filter::key_match(columns, &[sk]);
            if !keys.is_empty() {
                filter.extend(target.key_filter(keys));
            }
            ctx.count(cx, Select::from(target.table()).filter(filter)).await
        }
        Linkage::JoinTable(join) => {
            let Some(sk) = stored_key(source) else {
                return Outcome::Ok(0);
            };
            let mut filter = Filter::key_match(&join.source_columns, &[sk]);
            if !keys.is_empty() {
                filter.extend(Filter::key_match(&join.target_columns, keys));
            }
            ctx.count(cx, Select::from(&join.table).filter(filter)).await
        }
    }
}

/// Whether linking exactly `targets` would drop an existing link.
async fn drops_links(
    source: &Instance,
    association: &Association,
    target: &Model,
    cx: &Cx,
    targets: &[Instance],
) -> Outcome<bool, Error> {
    let total = try_outcome!(count_links(source, association, target, cx, &[]).await);
    if total == 0 {
        return Outcome::Ok(false);
    }
    let kept = match saved_keys(targets) {
        Some(keys) => try_outcome!(count_links(source, association, target, cx, &keys).await),
        None => 0,
    };
    Outcome::Ok(total > kept)
}

// ============================================================================
// get
// ============================================================================

/// Load linked targets matching `conditions`.
pub(super) async fn get(
    source: &Instance,
    association: &Association,
    cx: &Cx,
    conditions: Conditions,
) -> Outcome<Vec<Instance>, Error> {
    let target = try_ok!(association.target());
    let ctx = source.model().ctx();
    let extra = try_outcome!(resolve(&target, cx, &conditions, true).await);

    let link: Option<(Filter, Vec<Join>)> = match &association.info.linkage {
        Linkage::LocalKey { columns } => {
            local_key(source, columns).map(|fk| (target.key_filter(&[fk]), Vec::new()))
        }
        Linkage::RemoteKey { columns, .. } => {
            stored_key(source).map(|sk| (Filter::key_match(columns, &[sk]), Vec::new()))
        }
        Linkage::JoinTable(join) => match stored_key(source) {
            None => None,
            Some(sk) if ctx.driver.supports_join() => Some((
                Filter::new(),
                vec![Join {
                    table: join.table.clone(),
                    on: join
                        .target_columns
                        .iter()
                        .cloned()
                        .zip(target.key().iter().cloned())
                        .collect(),
                    filter: Filter::key_match(&join.source_columns, &[sk]),
                }],
            )),
            Some(sk) => {
                let pairs = Select::from(&join.table)
                    .filter(Filter::key_match(&join.source_columns, &[sk]))
                    .columns(Some(join.target_columns.clone()));
                let rows = try_outcome!(ctx.execute(cx, Operation::Select(pairs)).await);
                let keys: Vec<Vec<Value>> = rows
                    .iter()
                    .map(|row| row.values_for(&join.target_columns))
                    .collect();
                Some((target.key_filter(&keys), Vec::new()))
            }
        },
    };

    let found = match link {
        Some((filter, mut joins)) => {
            joins.extend(extra.joins);
            let mut select = Select::from(target.table()).filter(conjunction(filter, extra.filter));
            select.joins = joins;
            try_outcome!(target.select(cx, select).await)
        }
        None => Vec::new(),
    };

    if found.is_empty() && association.is_strict(source.model()) {
        return Outcome::Err(Error::not_found(
            target.name(),
            format!(
                "{} has no linked {}",
                source.model().name(),
                association.info.name
            ),
        ));
    }
    source.cache_put(&association.info.name, found.clone());
    Outcome::Ok(found)
}

// ============================================================================
// set / add
// ============================================================================

/// Link `targets`. With `replace`, existing links not in `targets` are
/// dropped once the new links are written, so a rejected write leaves the
/// previous links in place.
pub(super) async fn set(
    source: &Instance,
    association: &Association,
    cx: &Cx,
    targets: Vec<Instance>,
    replace: bool,
) -> Outcome<(), Error> {
    let target = try_ok!(association.target());
    try_ok!(check_targets(association, &target, &targets));
    let targets = distinct(targets);
    let info = &association.info;

    if !info.is_many() && targets.len() > 1 {
        return Outcome::Err(Error::validation(
            &info.name,
            ValidationErrorKind::Cardinality,
            format!("{} accepts a single instance, got {}", info.name, targets.len()),
        ));
    }
    if targets.is_empty() {
        if replace {
            return remove(source, association, cx, Vec::new()).await;
        }
        return Outcome::Ok(());
    }
    if targets.iter().any(|t| t.status() == InstanceStatus::Detached) {
        return Outcome::Err(Error::validation(
            &info.name,
            ValidationErrorKind::State,
            format!("cannot link a removed {} instance", target.name()),
        ));
    }

    let owned = matches!(info.linkage, Linkage::RemoteKey { owned: true, .. });
    if owned {
        if let Some(key) = stored_key(&targets[0]) {
            if !stored_key(source).is_some_and(|sk| same_key(&sk, &key)) {
                return Outcome::Err(Error::validation(
                    &info.name,
                    ValidationErrorKind::State,
                    format!("{} instance already extends another row", target.name()),
                ));
            }
        }
    } else {
        try_outcome!(ensure_saved(cx, &targets).await);
    }
    let local = matches!(info.linkage, Linkage::LocalKey { .. });
    if source.is_new() && !local {
        try_outcome!(source.save(cx).await);
    }

    let hooks = &association.hooks;
    let replacing = replace
        && (hooks.has(HookEvent::BeforeRemove) || hooks.has(HookEvent::AfterRemove))
        && try_outcome!(drops_links(source, association, &target, cx, &targets).await);
    if replacing {
        try_ok!(hooks.run(HookEvent::BeforeRemove, source));
    }
    try_ok!(hooks.run(HookEvent::BeforeSave, source));

    let ctx = source.model().ctx();
    match &info.linkage {
        Linkage::LocalKey { columns } => {
            let tk = try_ok!(targets[0].require_key("link"));
            let overlay = columns_row(columns, tk);
            if source.is_new() {
                try_outcome!(source.persist(cx, Some(&overlay)).await);
            } else {
                let sk = try_ok!(source.require_key("link"));
                let source_model = source.model();
                try_outcome!(
                    ctx.affected(
                        cx,
                        Operation::update(
                            source_model.table(),
                            overlay.clone(),
                            source_model.key_filter(&[sk]),
                        ),
                    )
                    .await
                );
                source.apply_clean(&overlay);
            }
        }
        Linkage::RemoteKey {
            columns,
            owned: false,
        } => {
            let sk = try_ok!(source.require_key("link"));
            let keys: Vec<Vec<Value>> = try_ok!(
                targets
                    .iter()
                    .map(|t| t.require_key("link"))
                    .collect::<Result<_>>()
            );
            let overlay = columns_row(columns, sk.clone());
            try_outcome!(
                ctx.affected(
                    cx,
                    Operation::update(target.table(), overlay.clone(), target.key_filter(&keys)),
                )
                .await
            );
            if replace {
                let stale = Filter::key_match(columns, &[sk]).not(target.key_filter(&keys));
                try_outcome!(
                    ctx.affected(cx, Operation::update(target.table(), null_row(columns), stale))
                        .await
                );
            }
            for instance in &targets {
                instance.apply_clean(&overlay);
            }
        }
        Linkage::RemoteKey {
            columns,
            owned: true,
        } => {
            let sk = try_ok!(source.require_key("link"));
            let chosen = &targets[0];
            if chosen.is_new() {
                let occupied = Select::from(target.table())
                    .filter(Filter::key_match(columns, &[sk.clone()]));
                let overlay = columns_row(columns, sk);
                if try_outcome!(ctx.count(cx, occupied).await) > 0 {
                    try_outcome!(chosen.persist_over(cx, &overlay).await);
                } else {
                    try_outcome!(chosen.persist(cx, Some(&overlay)).await);
                }
            } else if chosen.is_dirty() {
                try_outcome!(chosen.save(cx).await);
            }
        }
        Linkage::JoinTable(join) => {
            let sk = try_ok!(source.require_key("link"));
            let keys: Vec<Vec<Value>> = try_ok!(
                targets
                    .iter()
                    .map(|t| t.require_key("link"))
                    .collect::<Result<_>>()
            );
            let linked = Filter::key_match(&join.source_columns, &[sk.clone()]);
            let existing = Select::from(&join.table)
                .filter(conjunction(
                    linked.clone(),
                    Filter::key_match(&join.target_columns, &keys),
                ))
                .columns(Some(join.target_columns.clone()));
            let rows = try_outcome!(ctx.execute(cx, Operation::Select(existing)).await);
            let present: HashSet<u64> = rows
                .iter()
                .map(|row| hash_key(&row.values_for(&join.target_columns)))
                .collect();
            let mut inserted: Vec<Vec<Value>> = Vec::new();
            for key in &keys {
                if present.contains(&hash_key(key)) {
                    continue;
                }
                let mut pair = columns_row(&join.source_columns, sk.clone());
                pair.merge(&columns_row(&join.target_columns, key.clone()));
                match ctx.execute(cx, Operation::insert(&join.table, pair)).await {
                    Outcome::Err(err) => {
                        if !inserted.is_empty() {
                            let undo = conjunction(
                                linked.clone(),
                                Filter::key_match(&join.target_columns, &inserted),
                            );
                            if let Outcome::Err(undo_err) =
                                ctx.affected(cx, Operation::delete(&join.table, undo)).await
                            {
                                tracing::warn!(
                                    table = %join.table,
                                    error = %undo_err,
                                    "Failed to drop partially written links"
                                );
                            }
                        }
                        return Outcome::Err(err);
                    }
                    written => {
                        try_outcome!(written);
                    }
                }
                inserted.push(key.clone());
            }
            if replace {
                let stale = linked.not(Filter::key_match(&join.target_columns, &keys));
                try_outcome!(
                    ctx.affected(cx, Operation::delete(&join.table, stale))
                        .await
                );
            }
        }
    }

    source.cache_clear(&info.name);
    tracing::info!(
        model = source.model().name(),
        association = %info.name,
        targets = targets.len(),
        replace,
        "Linked instances"
    );
    if replacing {
        try_ok!(hooks.run(HookEvent::AfterRemove, source));
    }
    try_ok!(hooks.run(HookEvent::AfterSave, source));
    Outcome::Ok(())
}

// ============================================================================
// has
// ============================================================================

/// Whether anything is linked, or whether every one of `targets` is.
pub(super) async fn has(
    source: &Instance,
    association: &Association,
    cx: &Cx,
    targets: Vec<Instance>,
) -> Outcome<bool, Error> {
    let target = try_ok!(association.target());
    try_ok!(check_targets(association, &target, &targets));
    let targets = distinct(targets);
    let Some(keys) = saved_keys(&targets) else {
        return Outcome::Ok(false);
    };
    let n = try_outcome!(count_links(source, association, &target, cx, &keys).await);
    if keys.is_empty() {
        Outcome::Ok(n > 0)
    } else {
        Outcome::Ok(n == keys.len() as u64)
    }
}

// ============================================================================
// remove
// ============================================================================

/// Unlink `targets`, or everything when empty. Nothing linked is a no-op that
/// runs no hooks.
pub(super) async fn remove(
    source: &Instance,
    association: &Association,
    cx: &Cx,
    targets: Vec<Instance>,
) -> Outcome<(), Error> {
    let target = try_ok!(association.target());
    try_ok!(check_targets(association, &target, &targets));
    let targets = distinct(targets);
    let info = &association.info;
    let keys: Vec<Vec<Value>> = targets.iter().filter_map(stored_key).collect();
    if !targets.is_empty() && keys.is_empty() {
        return Outcome::Ok(());
    }

    let ctx = source.model().ctx();
    let hooks = &association.hooks;
    match &info.linkage {
        Linkage::LocalKey { columns } => {
            let Some(fk) = local_key(source, columns) else {
                return Outcome::Ok(());
            };
            if !keys.is_empty()
                && !keys
                    .iter()
                    .any(|k| k.iter().zip(&fk).all(|(a, b)| a.loose_eq(b)))
            {
                return Outcome::Ok(());
            }
            let cleared = null_row(columns);
            try_ok!(hooks.run(HookEvent::BeforeRemove, source));
            if let Some(sk) = stored_key(source) {
                let source_model = source.model();
                try_outcome!(
                    ctx.affected(
                        cx,
                        Operation::update(
                            source_model.table(),
                            cleared.clone(),
                            source_model.key_filter(&[sk]),
                        ),
                    )
                    .await
                );
            }
            source.apply_clean(&cleared);
        }
        Linkage::RemoteKey { columns, owned } => {
            let n = try_outcome!(count_links(source, association, &target, cx, &keys).await);
            if n == 0 {
                return Outcome::Ok(());
            }
            let Some(sk) = stored_key(source) else {
                return Outcome::Ok(());
            };
            let mut linked = Filter::key_match(columns, &[sk]);
            if !keys.is_empty() {
                linked.extend(target.key_filter(&keys));
            }
            try_ok!(hooks.run(HookEvent::BeforeRemove, source));
            if *owned {
                try_outcome!(
                    ctx.affected(cx, Operation::delete(target.table(), linked))
                        .await
                );
                for instance in &targets {
                    instance.mark_detached();
                }
            } else {
                let cleared = null_row(columns);
                try_outcome!(
                    ctx.affected(cx, Operation::update(target.table(), cleared.clone(), linked))
                        .await
                );
                for instance in &targets {
                    instance.apply_clean(&cleared);
                }
            }
        }
        Linkage::JoinTable(join) => {
            let n = try_outcome!(count_links(source, association, &target, cx, &keys).await);
            if n == 0 {
                return Outcome::Ok(());
            }
            let Some(sk) = stored_key(source) else {
                return Outcome::Ok(());
            };
            let mut linked = Filter::key_match(&join.source_columns, &[sk]);
            if !keys.is_empty() {
                linked.extend(Filter::key_match(&join.target_columns, &keys));
            }
            try_ok!(hooks.run(HookEvent::BeforeRemove, source));
            try_outcome!(
                ctx.affected(cx, Operation::delete(&join.table, linked))
                    .await
            );
        }
    }

    source.cache_clear(&info.name);
    tracing::info!(
        model = source.model().name(),
        association = %info.name,
        "Unlinked instances"
    );
    try_ok!(hooks.run(HookEvent::AfterRemove, source));
    Outcome::Ok(())
}
