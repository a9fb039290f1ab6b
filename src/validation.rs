//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Instance data validation.
//!
//! The validator enforces the data-tree invariants: top-level shape per
//! the options, default materialisation, key/unique/min-max checks,
//! mandatory nodes, leafref and instance-identifier closure, `when` with
//! optional auto-delete, `must`, and extension plugin hooks.
//!
//! `when` runs as a fixpoint: a condition that visits a node whose own
//! `when` is still undecided is retried in the next round, and every
//! round either resolves a condition or deletes a subtree, which bounds
//! the loop by the number of `when`-carrying nodes. All deletions of a
//! round happen before the next round evaluates anything, so an
//! evaluation never observes a half-deleted subtree.

use std::collections::HashMap;

use crate::context::operation_child;
use crate::data::{
    DataImplicitFlags, DataNodeId, DataTree, DataValidationFlags,
    DnodeFlags,
};
use crate::error::{Error, ErrorKind, Result};
use crate::schema::{
    SchemaFlags, SchemaNodeKind, SnodeId, SnodePayload, WhenSpec,
};
use crate::types::TypeSpec;
use crate::xpath::eval::{self, BoolOutcome};
use crate::xpath::XPathOptions;

pub(crate) fn validate(
    tree: &mut DataTree<'_>,
    options: DataValidationFlags,
) -> Result<()> {
    let ctx = tree.context;
    ctx.check_cancelled()?;

    // Phase 1: top-level shape.
    check_shape(tree, options)?;

    // Phase 2: default insertion.
    let mut implicit = DataImplicitFlags::empty();
    if options.contains(DataValidationFlags::NO_STATE) {
        implicit |= DataImplicitFlags::NO_STATE;
    }
    if options.contains(DataValidationFlags::REPLY) {
        implicit |= DataImplicitFlags::OUTPUT;
    }
    add_implicit_scoped(tree, implicit, options)?;

    // Phase 6 runs early in tree order: `when` deletes entire subtrees,
    // and every later phase must only see the surviving nodes.
    when_fixpoint(tree, options)?;

    // Phases 3-4: keys, uniques, min/max, mandatory.
    structural_pass(tree, options)?;

    // Phase 5: leafref and instance-identifier closure.
    leafref_pass(tree)?;

    // Phase 7: must conditions.
    must_pass(tree)?;

    // Phase 8: extension hooks.
    extension_pass(tree)?;
    Ok(())
}

fn alive_nodes(tree: &DataTree<'_>) -> Vec<DataNodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<DataNodeId> = tree.children_of(None).collect();
    stack.reverse();
    while let Some(id) = stack.pop() {
        out.push(id);
        let mut children: Vec<DataNodeId> =
            tree.children_of(Some(id)).collect();
        children.reverse();
        stack.extend(children);
    }
    out
}

// ===== phase 1: shape =====

fn check_shape(
    tree: &DataTree<'_>,
    options: DataValidationFlags,
) -> Result<()> {
    let ctx = tree.context;
    let operation = options.intersects(
        DataValidationFlags::RPC
            | DataValidationFlags::REPLY
            | DataValidationFlags::NOTIFICATION,
    );

    if operation {
        let mut roots = tree.children_of(None);
        let root = roots.next().ok_or_else(|| {
            Error::new(ErrorKind::InvalidData, "operation tree is empty")
        })?;
        if roots.next().is_some() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "operation tree must have a single root",
            ));
        }
        let kind = ctx.snodes[tree.node(root).schema].kind;
        let ok = match kind {
            SchemaNodeKind::Rpc | SchemaNodeKind::Action => options
                .intersects(
                    DataValidationFlags::RPC | DataValidationFlags::REPLY,
                ),
            SchemaNodeKind::Notification => {
                options.contains(DataValidationFlags::NOTIFICATION)
            }
            _ => false,
        };
        if !ok {
            return Err(Error::new_path(
                ErrorKind::InvalidData,
                "root node does not match the requested operation",
                tree.noderef(root).path(),
            ));
        }
        return Ok(());
    }

    for id in alive_nodes(tree) {
        let snode = &ctx.snodes[tree.node(id).schema];
        if matches!(
            snode.kind,
            SchemaNodeKind::Rpc
                | SchemaNodeKind::Action
                | SchemaNodeKind::Notification
        ) || snode.flags.intersects(
            SchemaFlags::IS_INPUT
                | SchemaFlags::IS_OUTPUT
                | SchemaFlags::IS_NOTIF,
        ) {
            return Err(Error::new_path(
                ErrorKind::InvalidData,
                "operation data is not allowed in a datastore tree",
                tree.noderef(id).path(),
            ));
        }
        if options.contains(DataValidationFlags::NO_STATE)
            && snode.flags.contains(SchemaFlags::CONFIG_R)
        {
            return Err(Error::new_path(
                ErrorKind::InvalidData,
                "state data is not allowed",
                tree.noderef(id).path(),
            ));
        }
    }
    Ok(())
}

// ===== phase 2: defaults =====

/// Public entry point used by [`DataTree::add_implicit`].
pub(crate) fn add_implicit(
    tree: &mut DataTree<'_>,
    options: DataImplicitFlags,
) -> Result<()> {
    add_implicit_scoped(tree, options, DataValidationFlags::empty())
}

fn add_implicit_scoped(
    tree: &mut DataTree<'_>,
    options: DataImplicitFlags,
    validation: DataValidationFlags,
) -> Result<()> {
    let ctx = tree.context;
    let output = options.contains(DataImplicitFlags::OUTPUT);

    if validation.intersects(
        DataValidationFlags::RPC
            | DataValidationFlags::REPLY
            | DataValidationFlags::NOTIFICATION,
    ) {
        let Some(root) = tree.first_root else {
            return Ok(());
        };
        let schema = tree.node(root).schema;
        let first = match ctx.snodes[schema].kind {
            SchemaNodeKind::Rpc | SchemaNodeKind::Action => {
                match operation_child(ctx, schema, output) {
                    Some(envelope) => ctx.snodes[envelope].first_child,
                    None => None,
                }
            }
            _ => ctx.snodes[schema].first_child,
        };
        return add_implicit_level(tree, Some(root), first, options);
    }

    // Datastore tree: walk the top level of every module in scope.
    let present: Vec<crate::schema::ModuleId> = tree
        .children_of(None)
        .map(|id| ctx.snodes[tree.node(id).schema].module)
        .collect();
    let modules: Vec<crate::schema::ModuleId> = ctx
        .modules
        .ids()
        .filter(|id| {
            !validation.contains(DataValidationFlags::PRESENT)
                || present.contains(id)
        })
        .collect();
    for module in modules {
        let first = ctx.modules[module].data;
        add_implicit_level(tree, None, first, options)?;
    }
    Ok(())
}

/// Walk one schema level, creating missing non-presence containers and
/// default leaves/leaf-lists, then recurse into the present instances.
fn add_implicit_level(
    tree: &mut DataTree<'_>,
    parent: Option<DataNodeId>,
    first: Option<SnodeId>,
    options: DataImplicitFlags,
) -> Result<()> {
    let ctx = tree.context;
    let chain: Vec<SnodeId> = ctx.schild_iter(first).collect();
    for snode_id in chain {
        let snode = &ctx.snodes[snode_id];
        // Config/state scoping.
        if snode.flags.contains(SchemaFlags::CONFIG_W)
            && options.contains(DataImplicitFlags::NO_CONFIG)
        {
            continue;
        }
        if snode.flags.contains(SchemaFlags::CONFIG_R)
            && options.contains(DataImplicitFlags::NO_STATE)
        {
            continue;
        }
        match snode.kind {
            SchemaNodeKind::Container => {
                let presence = matches!(
                    snode.payload,
                    SnodePayload::Container { presence: true }
                );
                let existing = tree
                    .children_of(parent)
                    .find(|id| tree.node(*id).schema == snode_id);
                let instance = match existing {
                    Some(id) => Some(id),
                    None if !presence => Some(tree.add_child(
                        parent,
                        snode_id,
                        None,
                        DnodeFlags::DEFAULT,
                    )?),
                    None => None,
                };
                if let Some(instance) = instance {
                    add_implicit_level(
                        tree,
                        Some(instance),
                        ctx.snodes[snode_id].first_child,
                        options,
                    )?;
                }
            }
            SchemaNodeKind::Leaf => {
                if options.contains(DataImplicitFlags::NO_DEFAULTS)
                    || snode.flags.contains(SchemaFlags::KEY)
                {
                    continue;
                }
                let default = match &snode.payload {
                    SnodePayload::Leaf(leaf) => leaf.default.clone(),
                    _ => None,
                };
                if let Some(default) = default {
                    let exists = tree
                        .children_of(parent)
                        .any(|id| tree.node(id).schema == snode_id);
                    if !exists {
                        tree.add_child(
                            parent,
                            snode_id,
                            Some(default),
                            DnodeFlags::DEFAULT,
                        )?;
                    }
                }
            }
            SchemaNodeKind::LeafList => {
                if options.contains(DataImplicitFlags::NO_DEFAULTS) {
                    continue;
                }
                let defaults = match &snode.payload {
                    SnodePayload::LeafList(leaflist) => {
                        leaflist.defaults.clone()
                    }
                    _ => Vec::new(),
                };
                let exists = tree
                    .children_of(parent)
                    .any(|id| tree.node(id).schema == snode_id);
                if !exists {
                    for default in defaults {
                        tree.add_child(
                            parent,
                            snode_id,
                            Some(default),
                            DnodeFlags::DEFAULT,
                        )?;
                    }
                }
            }
            SchemaNodeKind::List => {
                let instances: Vec<DataNodeId> = tree
                    .children_of(parent)
                    .filter(|id| tree.node(*id).schema == snode_id)
                    .collect();
                for instance in instances {
                    add_implicit_level(
                        tree,
                        Some(instance),
                        ctx.snodes[snode_id].first_child,
                        options,
                    )?;
                }
            }
            SchemaNodeKind::Choice => {
                let active = active_case(tree, parent, snode_id);
                if let Some(case) = active {
                    add_implicit_level(
                        tree,
                        parent,
                        ctx.snodes[case].first_child,
                        options,
                    )?;
                }
            }
            _ => (),
        }
    }
    Ok(())
}

/// The case of a choice that has instantiated data under `parent`, or
/// the default case when none has.
fn active_case(
    tree: &DataTree<'_>,
    parent: Option<DataNodeId>,
    choice: SnodeId,
) -> Option<SnodeId> {
    let ctx = tree.context;
    for child in tree.children_of(parent) {
        let mut ancestor = Some(tree.node(child).schema);
        while let Some(id) = ancestor {
            let snode = &ctx.snodes[id];
            if snode.kind == SchemaNodeKind::Case
                && snode.parent == Some(choice)
            {
                return Some(id);
            }
            ancestor = snode.parent;
        }
    }
    match ctx.snodes[choice].payload {
        SnodePayload::Choice { default_case } => default_case,
        _ => None,
    }
}

// ===== phase 6: when fixpoint =====

/// The `when` conditions applying to a data node: those on its own
/// schema node plus those on schema-only (choice/case) ancestors up to
/// the nearest data ancestor.
fn applicable_whens(
    tree: &DataTree<'_>,
    id: DataNodeId,
) -> Vec<(WhenSpec, bool)> {
    let ctx = tree.context;
    let mut out = Vec::new();
    let schema = tree.node(id).schema;
    for when in &ctx.snodes[schema].whens {
        out.push((when.clone(), when.ctx_is_parent));
    }
    let mut ancestor = ctx.snodes[schema].parent;
    while let Some(aid) = ancestor {
        let snode = &ctx.snodes[aid];
        if snode.is_data_node() {
            break;
        }
        for when in &snode.whens {
            // Conditions inherited through choice/case evaluate with the
            // data parent as context.
            out.push((when.clone(), true));
        }
        ancestor = snode.parent;
    }
    out
}

fn when_fixpoint(
    tree: &mut DataTree<'_>,
    options: DataValidationFlags,
) -> Result<()> {
    let ctx = tree.context;

    // Mark every node carrying an undecided when.
    let mut pending = 0usize;
    for id in alive_nodes(tree) {
        if !applicable_whens(tree, id).is_empty() {
            tree.node_mut(id).flags |= DnodeFlags::UNRES_WHEN;
            pending += 1;
        }
    }
    if pending == 0 {
        return Ok(());
    }

    // Every iteration either resolves a condition or deletes a subtree,
    // so the loop is bounded by the number of when-carrying nodes.
    let limit = pending + 1;
    for _ in 0..limit {
        ctx.check_cancelled()?;
        let mut progress = false;
        let mut remaining = 0usize;
        for id in alive_nodes(tree) {
            if tree.get_node(id).is_none() {
                continue;
            }
            if !tree.node(id).flags.contains(DnodeFlags::UNRES_WHEN) {
                continue;
            }
            match eval_whens_of(tree, id)? {
                WhenResult::True => {
                    tree.node_mut(id).flags.remove(DnodeFlags::UNRES_WHEN);
                    progress = true;
                }
                WhenResult::False => {
                    if options.contains(DataValidationFlags::WHEN_AUTO_DEL)
                        && !tree
                            .node(id)
                            .flags
                            .contains(DnodeFlags::INUSE)
                    {
                        tree.unlink_subtree(id);
                        progress = true;
                    } else {
                        return Err(Error::new_path(
                            ErrorKind::WhenFalse,
                            "when condition is false",
                            tree.noderef(id).path(),
                        ));
                    }
                }
                WhenResult::Unresolved => {
                    remaining += 1;
                }
            }
        }
        if remaining == 0 {
            return Ok(());
        }
        if !progress {
            return Err(Error::new(
                ErrorKind::CircularDependency,
                "circular dependency between when conditions",
            ));
        }
    }
    Err(Error::new(
        ErrorKind::Other,
        "when condition fixpoint did not terminate",
    ))
}

enum WhenResult {
    True,
    False,
    Unresolved,
}

fn eval_whens_of(
    tree: &DataTree<'_>,
    id: DataNodeId,
) -> Result<WhenResult> {
    let whens = applicable_whens(tree, id);
    let parent = tree.node(id).parent;
    for (when, ctx_is_parent) in whens {
        let ctx_node = if ctx_is_parent { parent } else { Some(id) };
        // The node under evaluation must not defer on itself: mask its
        // own flag for the duration of the check by evaluating the
        // condition from its (already decided or distinct) context.
        let outcome = eval::eval_bool(
            tree,
            &when.expr,
            ctx_node,
            when.module,
            XPathOptions::WHEN_ENABLED,
        )
        .map_err(|err| err.with_path(tree.noderef(id).path()))?;
        match outcome {
            BoolOutcome::True => continue,
            BoolOutcome::False => return Ok(WhenResult::False),
            BoolOutcome::Unresolved => return Ok(WhenResult::Unresolved),
        }
    }
    Ok(WhenResult::True)
}

// ===== phases 3-4: structure =====

fn structural_pass(
    tree: &DataTree<'_>,
    options: DataValidationFlags,
) -> Result<()> {
    let ctx = tree.context;
    if options.intersects(
        DataValidationFlags::RPC
            | DataValidationFlags::REPLY
            | DataValidationFlags::NOTIFICATION,
    ) {
        let Some(root) = tree.first_root else {
            return Ok(());
        };
        let schema = tree.node(root).schema;
        let first = match ctx.snodes[schema].kind {
            SchemaNodeKind::Rpc | SchemaNodeKind::Action => {
                let output = options.contains(DataValidationFlags::REPLY);
                match operation_child(ctx, schema, output) {
                    Some(envelope) => ctx.snodes[envelope].first_child,
                    None => None,
                }
            }
            _ => ctx.snodes[schema].first_child,
        };
        return check_level(tree, Some(root), first);
    }

    let present: Vec<crate::schema::ModuleId> = tree
        .children_of(None)
        .map(|id| ctx.snodes[tree.node(id).schema].module)
        .collect();
    for module in ctx.modules.ids() {
        if options.contains(DataValidationFlags::PRESENT)
            && !present.contains(&module)
        {
            continue;
        }
        check_level(tree, None, ctx.modules[module].data)?;
    }
    Ok(())
}

fn check_level(
    tree: &DataTree<'_>,
    parent: Option<DataNodeId>,
    first: Option<SnodeId>,
) -> Result<()> {
    let ctx = tree.context;
    for snode_id in ctx.schild_iter(first) {
        let snode = &ctx.snodes[snode_id];
        let instances: Vec<DataNodeId> = tree
            .children_of(parent)
            .filter(|id| tree.node(*id).schema == snode_id)
            .collect();
        match snode.kind {
            SchemaNodeKind::Container => {
                for instance in &instances {
                    check_level(
                        tree,
                        Some(*instance),
                        snode.first_child,
                    )?;
                }
            }
            SchemaNodeKind::Leaf => {
                if snode.flags.contains(SchemaFlags::MAND_TRUE)
                    && instances.is_empty()
                {
                    return Err(mandatory_error(tree, parent, snode_id));
                }
            }
            SchemaNodeKind::AnyData | SchemaNodeKind::AnyXml => {
                if snode.flags.contains(SchemaFlags::MAND_TRUE)
                    && instances.is_empty()
                {
                    return Err(mandatory_error(tree, parent, snode_id));
                }
            }
            SchemaNodeKind::LeafList => {
                check_cardinality(tree, parent, snode_id, &instances)?;
                // Configuration leaf-lists must not repeat values.
                if snode.flags.contains(SchemaFlags::CONFIG_W) {
                    let mut seen = HashMap::new();
                    for instance in &instances {
                        let canonical = tree
                            .node(*instance)
                            .value
                            .as_ref()
                            .map(|v| v.canonical.clone())
                            .unwrap_or_default();
                        if let Some(_first) =
                            seen.insert(canonical, *instance)
                        {
                            return Err(Error::new_path(
                                ErrorKind::DuplicateInstance,
                                "duplicate leaf-list instance",
                                tree.noderef(*instance).path(),
                            ));
                        }
                    }
                }
            }
            SchemaNodeKind::List => {
                check_cardinality(tree, parent, snode_id, &instances)?;
                check_list_instances(tree, snode_id, &instances)?;
                for instance in &instances {
                    check_level(
                        tree,
                        Some(*instance),
                        snode.first_child,
                    )?;
                }
            }
            SchemaNodeKind::Choice => {
                let active = active_case(tree, parent, snode_id);
                match active {
                    Some(case) => {
                        check_level(
                            tree,
                            parent,
                            ctx.snodes[case].first_child,
                        )?;
                        check_case_exclusive(
                            tree, parent, snode_id, case,
                        )?;
                    }
                    None => {
                        if snode.flags.contains(SchemaFlags::MAND_TRUE) {
                            return Err(mandatory_error(
                                tree, parent, snode_id,
                            ));
                        }
                    }
                }
            }
            _ => (),
        }
    }
    Ok(())
}

fn mandatory_error(
    tree: &DataTree<'_>,
    parent: Option<DataNodeId>,
    snode: SnodeId,
) -> Error {
    let ctx = tree.context;
    let parent_path = parent
        .map(|id| tree.noderef(id).path())
        .unwrap_or_default();
    Error::new_path(
        ErrorKind::Mandatory,
        format!(
            "mandatory node \"{}\" is missing",
            ctx.resolve(ctx.snodes[snode].name)
        ),
        format!("{}/{}", parent_path, ctx.resolve(ctx.snodes[snode].name)),
    )
}

fn check_cardinality(
    tree: &DataTree<'_>,
    parent: Option<DataNodeId>,
    snode_id: SnodeId,
    instances: &[DataNodeId],
) -> Result<()> {
    let ctx = tree.context;
    let snode = &ctx.snodes[snode_id];
    let count = instances.len() as u32;
    if count < snode.min_elements() || count > snode.max_elements() {
        let path = match instances.first() {
            Some(id) => tree.noderef(*id).path(),
            None => {
                let parent_path = parent
                    .map(|id| tree.noderef(id).path())
                    .unwrap_or_default();
                format!("{}/{}", parent_path, ctx.resolve(snode.name))
            }
        };
        return Err(Error::new_path(
            ErrorKind::MinMaxElements,
            format!(
                "\"{}\" has {} instance(s), allowed range is {}..{}",
                ctx.resolve(snode.name),
                count,
                snode.min_elements(),
                match snode.max_elements() {
                    u32::MAX => "unbounded".to_string(),
                    max => max.to_string(),
                }
            ),
            path,
        ));
    }
    Ok(())
}

/// Key completeness, key-tuple uniqueness and `unique` constraints.
fn check_list_instances(
    tree: &DataTree<'_>,
    list: SnodeId,
    instances: &[DataNodeId],
) -> Result<()> {
    let ctx = tree.context;
    let (keys, uniques) = match &ctx.snodes[list].payload {
        SnodePayload::List(payload) => {
            (payload.keys.clone(), payload.uniques.clone())
        }
        _ => return Ok(()),
    };

    if !keys.is_empty() {
        let mut seen: HashMap<Vec<String>, DataNodeId> = HashMap::new();
        for instance in instances {
            let mut tuple = Vec::with_capacity(keys.len());
            for key in &keys {
                let value = tree
                    .children_of(Some(*instance))
                    .find(|id| tree.node(*id).schema == *key)
                    .and_then(|id| {
                        tree.node(id)
                            .value
                            .as_ref()
                            .map(|v| v.canonical.clone())
                    });
                match value {
                    Some(value) => tuple.push(value),
                    None => {
                        return Err(Error::new_path(
                            ErrorKind::ListKey,
                            format!(
                                "list key \"{}\" is missing",
                                ctx.resolve(ctx.snodes[*key].name)
                            ),
                            tree.noderef(*instance).path(),
                        ));
                    }
                }
            }
            if seen.insert(tuple, *instance).is_some() {
                return Err(Error::new_path(
                    ErrorKind::DuplicateInstance,
                    "duplicate list instance",
                    tree.noderef(*instance).path(),
                ));
            }
        }
    }

    // Unique constraints: project the referenced leaves per instance;
    // instances missing any leaf do not participate.
    for unique in &uniques {
        let mut seen: HashMap<Vec<String>, DataNodeId> = HashMap::new();
        for instance in instances {
            let mut tuple = Vec::with_capacity(unique.len());
            let mut complete = true;
            for leaf in unique {
                let value = find_descendant_value(tree, *instance, *leaf);
                match value {
                    Some(value) => tuple.push(value),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            if seen.insert(tuple, *instance).is_some() {
                return Err(Error::new_path(
                    ErrorKind::Unique,
                    "unique constraint violated",
                    tree.noderef(*instance).path(),
                ));
            }
        }
    }
    Ok(())
}

fn find_descendant_value(
    tree: &DataTree<'_>,
    instance: DataNodeId,
    leaf: SnodeId,
) -> Option<String> {
    let mut stack: Vec<DataNodeId> =
        tree.children_of(Some(instance)).collect();
    while let Some(id) = stack.pop() {
        if tree.node(id).schema == leaf {
            return tree.node(id).value.as_ref().map(|v| v.canonical.clone());
        }
        stack.extend(tree.children_of(Some(id)));
    }
    None
}

/// Data from more than one case of the same choice is invalid.
fn check_case_exclusive(
    tree: &DataTree<'_>,
    parent: Option<DataNodeId>,
    choice: SnodeId,
    active: SnodeId,
) -> Result<()> {
    let ctx = tree.context;
    for child in tree.children_of(parent) {
        let mut ancestor = Some(tree.node(child).schema);
        while let Some(id) = ancestor {
            let snode = &ctx.snodes[id];
            if snode.kind == SchemaNodeKind::Case
                && snode.parent == Some(choice)
            {
                if id != active {
                    return Err(Error::new_path(
                        ErrorKind::InvalidData,
                        "data from multiple cases of the same choice",
                        tree.noderef(child).path(),
                    ));
                }
                break;
            }
            ancestor = snode.parent;
        }
    }
    Ok(())
}

// ===== phase 5: leafref / instance-identifier =====

fn leafref_pass(tree: &mut DataTree<'_>) -> Result<()> {
    let ctx = tree.context;
    let mut resolved: Vec<(DataNodeId, DataNodeId)> = Vec::new();

    for id in alive_nodes(tree) {
        let node = tree.node(id);
        let Some(ty) = ctx.snodes[node.schema].leaf_type() else {
            continue;
        };
        match &ctx.types[ty].spec {
            TypeSpec::Leafref {
                path,
                path_module,
                require_instance,
                ..
            } => {
                let value = node
                    .value
                    .as_ref()
                    .map(|v| v.canonical.clone())
                    .unwrap_or_default();
                let candidates = eval::eval_node_ids(
                    tree,
                    path,
                    Some(id),
                    *path_module,
                    XPathOptions::empty(),
                )
                .map_err(|err| err.with_path(tree.noderef(id).path()))?;
                let target = candidates.into_iter().find(|candidate| {
                    tree.node(*candidate)
                        .value
                        .as_ref()
                        .is_some_and(|v| v.canonical == value)
                });
                match target {
                    Some(target) => resolved.push((id, target)),
                    None if *require_instance => {
                        return Err(Error::new_path(
                            ErrorKind::LeafrefNoTarget,
                            format!(
                                "leafref target with value \"{}\" does not exist",
                                value
                            ),
                            tree.noderef(id).path(),
                        ));
                    }
                    None => (),
                }
            }
            TypeSpec::InstanceIdentifier { require_instance } => {
                let Some(value) = node.value.as_ref() else {
                    continue;
                };
                let target =
                    eval::resolve_instance_id(tree, &value.canonical)?;
                match target {
                    Some(target) => resolved.push((id, target)),
                    None if *require_instance => {
                        return Err(Error::new_path(
                            ErrorKind::InstanceIdNoTarget,
                            format!(
                                "instance-identifier \"{}\" has no target",
                                value.canonical
                            ),
                            tree.noderef(id).path(),
                        ));
                    }
                    None => (),
                }
            }
            _ => (),
        }
    }

    for (source, target) in resolved {
        tree.node_mut(source).target = Some(target);
        tree.node_mut(target).flags |= DnodeFlags::INUSE;
    }
    Ok(())
}

// ===== phase 7: must =====

fn must_pass(tree: &DataTree<'_>) -> Result<()> {
    let ctx = tree.context;
    for id in alive_nodes(tree) {
        let schema = tree.node(id).schema;
        if ctx.snodes[schema].musts.is_empty() {
            continue;
        }
        let musts = ctx.snodes[schema].musts.clone();
        for must in &musts {
            let outcome = eval::eval_bool(
                tree,
                &must.expr,
                Some(id),
                must.module,
                XPathOptions::empty(),
            )
            .map_err(|err| err.with_path(tree.noderef(id).path()))?;
            if outcome != BoolOutcome::True {
                let msg = must
                    .emsg
                    .map(|sym| ctx.resolve(sym).to_string())
                    .unwrap_or_else(|| {
                        format!(
                            "must condition \"{}\" not satisfied",
                            must.expr.text()
                        )
                    });
                let apptag =
                    must.eapptag.map(|sym| ctx.resolve(sym).to_string());
                return Err(Error::new_path(
                    ErrorKind::MustFalse,
                    msg,
                    tree.noderef(id).path(),
                )
                .with_apptag(apptag));
            }
        }
    }
    Ok(())
}

// ===== phase 8: extension hooks =====

fn extension_pass(tree: &DataTree<'_>) -> Result<()> {
    let ctx = tree.context;
    for id in alive_nodes(tree) {
        let schema = tree.node(id).schema;
        if ctx.snodes[schema].exts.is_empty() {
            continue;
        }
        let dnode = tree.noderef(id);
        let snode = dnode.schema();
        for ext in snode.extensions() {
            if let Some(plugin) = ctx.ext_plugin(ext.raw()) {
                (plugin.validate)(ctx, &dnode, &ext)?;
            }
        }
    }
    Ok(())
}
