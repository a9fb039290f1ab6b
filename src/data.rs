//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! YANG instance data.
//!
//! A [`DataTree`] owns its nodes in a slab indexed by [`DataNodeId`];
//! parent links, ordered sibling links and child links are ids, so
//! removing a subtree frees its slots without touching the rest of the
//! tree. Every node points at its schema node; terminal nodes addition-
//! ally carry the typed value and its canonical lexical form produced by
//! the `store-value` primitive.

use bitflags::bitflags;

use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::iter::{
    Ancestors, MetadataList, NodeIterable, Set, Siblings, Traverse,
};
use crate::schema::{
    DataValue, SchemaFlags, SchemaModule, SchemaNode, SchemaNodeKind,
    SnodeId, SnodePayload,
};
use crate::types::{store_value, StoredValue};
use crate::validation;
use crate::xpath::eval::{self, XPathValue};
use crate::xpath::{XPathExpr, XPathOptions};

bitflags! {
    /// Data factory options, mirrored from the behaviour external parsers
    /// are expected to request.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DataParserFlags: u32 {
        /// Reject out-of-order list keys instead of reordering them with a
        /// warning.
        const STRICT = 0x01;
    }
}

bitflags! {
    /// Data validation options.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DataValidationFlags: u32 {
        /// Consider state data not allowed and raise an error if found.
        const NO_STATE = 0x01;
        /// Validate only modules whose data actually exist.
        const PRESENT = 0x02;
        /// The tree is an RPC/action invocation (input data).
        const RPC = 0x04;
        /// The tree is an RPC/action reply (output data).
        const REPLY = 0x08;
        /// The tree is a notification.
        const NOTIFICATION = 0x10;
        /// Remove subtrees whose `when` evaluates to false instead of
        /// failing validation.
        const WHEN_AUTO_DEL = 0x20;
    }
}

bitflags! {
    /// Implicit node creation options.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DataImplicitFlags: u32 {
        /// Do not add any implicit state nodes.
        const NO_STATE = 0x01;
        /// Do not add any implicit config nodes.
        const NO_CONFIG = 0x02;
        /// Do not add any default nodes, only non-presence containers.
        const NO_DEFAULTS = 0x04;
        /// For RPC/action nodes, add output implicit nodes instead of
        /// input.
        const OUTPUT = 0x08;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct DnodeFlags: u8 {
        /// Node was created by default materialisation.
        const DEFAULT = 0x01;
        /// The node's `when` has not been decided yet (validation
        /// internal).
        const UNRES_WHEN = 0x02;
        /// Node is referenced as a leafref target.
        const INUSE = 0x04;
    }
}

/// Identifier of a node inside its [`DataTree`]. Plain `Copy` token that
/// can be stored across factory calls while the tree is being built.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DataNodeId(pub(crate) u32);

/// One metadata attribute attached to a data node (RFC 7952 annotation).
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MetaAttr {
    pub module: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug)]
pub(crate) struct Dnode {
    pub schema: SnodeId,
    pub parent: Option<DataNodeId>,
    pub prev: Option<DataNodeId>,
    pub next: Option<DataNodeId>,
    pub first_child: Option<DataNodeId>,
    pub last_child: Option<DataNodeId>,
    pub flags: DnodeFlags,
    pub value: Option<StoredValue>,
    /// Resolved leafref/instance-identifier target (non-owning).
    pub target: Option<DataNodeId>,
    pub meta: Vec<MetaAttr>,
}

/// YANG data tree.
#[derive(Debug)]
pub struct DataTree<'a> {
    pub(crate) context: &'a Context,
    pub(crate) nodes: Vec<Option<Dnode>>,
    free: Vec<u32>,
    pub(crate) first_root: Option<DataNodeId>,
    options: DataParserFlags,
}

/// YANG data node reference.
#[derive(Clone, Debug)]
pub struct DataNodeRef<'a> {
    pub(crate) tree: &'a DataTree<'a>,
    pub(crate) id: DataNodeId,
}

/// The structure provides information about metadata of a data element.
/// Such attributes must map to annotations as specified in RFC 7952.
#[derive(Clone, Debug)]
pub struct Metadata<'a> {
    tree: &'a DataTree<'a>,
    node: DataNodeId,
    index: usize,
}

/// Methods common to data trees and data node references.
pub trait Data<'a> {
    #[doc(hidden)]
    fn context(&self) -> &'a Context {
        self.tree().context
    }

    #[doc(hidden)]
    fn tree(&self) -> &DataTree<'a>;

    #[doc(hidden)]
    fn eval_context(&self) -> Option<DataNodeId>;

    /// Evaluate a compiled XPath expression with this node (or the tree
    /// root) as the context node. Unprefixed names resolve to
    /// `local_module`.
    fn eval_xpath(
        &'a self,
        expr: &XPathExpr,
        local_module: &SchemaModule<'_>,
        options: XPathOptions,
    ) -> Result<XPathValue<'a>> {
        eval::eval_data(
            self.tree(),
            expr,
            self.eval_context(),
            local_module.id,
            options,
        )
        .inspect_err(|err| self.context().record_error(err))
    }

    /// Search in the data for instances of nodes matching the provided
    /// XPath. The first node in every path should carry its module name
    /// as prefix; unprefixed names resolve to the module of the first
    /// root node.
    fn find_xpath(&'a self, xpath: &str) -> Result<Set<'a, DataNodeRef<'a>>> {
        let tree = self.tree();
        let expr = XPathExpr::compile(xpath)
            .inspect_err(|err| self.context().record_error(err))?;
        let local_module = tree.default_module()?;
        match self.eval_xpath(&expr, &local_module, XPathOptions::empty())? {
            XPathValue::Nodes(nodes) => Ok(Set::new(nodes)),
            _ => {
                let err = Error::new(
                    ErrorKind::TypeMismatch,
                    "expression does not evaluate to a node set",
                );
                self.context().record_error(&err);
                Err(err)
            }
        }
    }

    /// Search in the data for a single node matching the provided XPath.
    fn find_path(&'a self, path: &str) -> Result<DataNodeRef<'a>> {
        let mut set = self.find_xpath(path)?;
        let first = set.next().ok_or_else(|| {
            let err = Error::new_path(
                ErrorKind::InstanceIdNoTarget,
                "no data node found for path",
                path,
            );
            self.context().record_error(&err);
            err
        })?;
        if set.next().is_some() {
            return Err(Error::new_path(
                ErrorKind::Other,
                "path matches more than one data node",
                path,
            ));
        }
        Ok(first)
    }
}

// ===== path parsing =====

#[derive(Debug)]
pub(crate) struct PathSegment<'a> {
    pub prefix: Option<&'a str>,
    pub name: &'a str,
    /// `[key='value']` predicates.
    pub keys: Vec<(&'a str, String)>,
    /// `[.='value']` predicate of a leaf-list instance.
    pub value: Option<String>,
}

/// Parse a simple data path of the form
/// `/prefix:name[key='value']/name[.='value']`.
pub(crate) fn parse_data_path(path: &str) -> Result<Vec<PathSegment<'_>>> {
    let err =
        |msg: &str| Error::new_path(ErrorKind::Syntax, msg.to_string(), path);
    let mut segments = Vec::new();
    let mut rest = path
        .strip_prefix('/')
        .ok_or_else(|| err("data path must be absolute"))?;
    while !rest.is_empty() {
        let end = rest
            .find(['/', '['])
            .unwrap_or(rest.len());
        let (qname, mut tail) = rest.split_at(end);
        if qname.is_empty() {
            return Err(err("empty path segment"));
        }
        let (prefix, name) = match qname.split_once(':') {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, qname),
        };
        let mut segment = PathSegment {
            prefix,
            name,
            keys: Vec::new(),
            value: None,
        };
        while let Some(inner) = tail.strip_prefix('[') {
            let close = inner
                .find(']')
                .ok_or_else(|| err("unterminated predicate"))?;
            let (pred, after) = inner.split_at(close);
            tail = &after[1..];
            let (target, raw_value) = pred
                .split_once('=')
                .ok_or_else(|| err("malformed predicate"))?;
            let raw_value = raw_value.trim();
            let unquoted = raw_value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| {
                    raw_value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                })
                .ok_or_else(|| err("predicate value must be quoted"))?;
            match target.trim() {
                "." => segment.value = Some(unquoted.to_string()),
                key => segment.keys.push((key, unquoted.to_string())),
            }
        }
        segments.push(segment);
        rest = match tail.strip_prefix('/') {
            Some(next) => next,
            None if tail.is_empty() => "",
            None => return Err(err("malformed path")),
        };
    }
    if segments.is_empty() {
        return Err(err("empty path"));
    }
    Ok(segments)
}

// ===== impl DataTree =====

impl<'a> DataTree<'a> {
    /// Create new empty data tree.
    pub fn new(context: &'a Context) -> DataTree<'a> {
        DataTree::new_with_options(context, DataParserFlags::empty())
    }

    /// Create new empty data tree with explicit factory options.
    pub fn new_with_options(
        context: &'a Context,
        options: DataParserFlags,
    ) -> DataTree<'a> {
        DataTree {
            context,
            nodes: Vec::new(),
            free: Vec::new(),
            first_root: None,
            options,
        }
    }

    /// Returns a reference to the first top-level data node, unless the
    /// data tree is empty.
    pub fn reference(&self) -> Option<DataNodeRef<'_>> {
        self.first_root.map(|id| DataNodeRef { tree: self, id })
    }

    /// Returns a reference for the given node id.
    pub fn noderef(&self, id: DataNodeId) -> DataNodeRef<'_> {
        debug_assert!(self.nodes[id.0 as usize].is_some());
        DataNodeRef { tree: self, id }
    }

    /// Returns an iterator over all elements in the data tree (depth-first
    /// search algorithm).
    pub fn traverse(&self) -> impl Iterator<Item = DataNodeRef<'_>> {
        let roots = Siblings::new(self.reference());
        roots.flat_map(|dnode| dnode.traverse())
    }

    /// Validate the data tree, materialising defaults and auto-deleting
    /// false-`when` subtrees as requested by the options.
    pub fn validate(&mut self, options: DataValidationFlags) -> Result<()> {
        validation::validate(self, options).inspect_err(|err| {
            self.context.record_error(err);
        })
    }

    /// Add any missing implicit nodes: non-presence containers and, unless
    /// suppressed, default leaves and leaf-lists.
    pub fn add_implicit(&mut self, options: DataImplicitFlags) -> Result<()> {
        validation::add_implicit(self, options)
            .inspect_err(|err| self.context.record_error(err))
    }

    /// Create a new node (or update an existing one) based on the given
    /// data path. Intermediate nodes are created as needed; list segments
    /// identify their instance through key predicates.
    ///
    /// Returns the id of the deepest node touched by the path.
    pub fn new_path(
        &mut self,
        path: &str,
        value: Option<&str>,
    ) -> Result<DataNodeId> {
        let context = self.context;
        let segments = parse_data_path(path).inspect_err(|err| {
            context.record_error(err);
        })?;
        let last = segments.len() - 1;
        let mut parent: Option<DataNodeId> = None;
        let mut result = None;
        for (depth, segment) in segments.iter().enumerate() {
            let leaf_value = if depth == last {
                value.map(str::to_string).or_else(|| segment.value.clone())
            } else {
                segment.value.clone()
            };
            let id = self
                .apply_segment(parent, segment, leaf_value.as_deref())
                .inspect_err(|err| context.record_error(err))?;
            parent = Some(id);
            result = Some(id);
        }
        Ok(result.unwrap())
    }

    /// Remove the node identified by the path, together with its subtree.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        match eval::resolve_instance_id(self, path)? {
            Some(id) => {
                self.unlink_subtree(id);
                Ok(())
            }
            None => {
                let err = Error::new_path(
                    ErrorKind::InstanceIdNoTarget,
                    "no data node found for path",
                    path,
                );
                self.context.record_error(&err);
                Err(err)
            }
        }
    }

    /// Create an inner node (container, list instance, RPC or
    /// notification) under `parent`.
    pub fn new_inner(
        &mut self,
        parent: Option<DataNodeId>,
        snode: &SchemaNode<'_>,
    ) -> Result<DataNodeId> {
        match snode.kind() {
            SchemaNodeKind::Container
            | SchemaNodeKind::List
            | SchemaNodeKind::Rpc
            | SchemaNodeKind::Action
            | SchemaNodeKind::Notification
            | SchemaNodeKind::AnyData
            | SchemaNodeKind::AnyXml => {
                self.add_child(parent, snode.id, None, DnodeFlags::empty())
            }
            _ => Err(Error::new(
                ErrorKind::InvalidData,
                format!("node \"{}\" is not an inner node", snode.name()),
            )),
        }
    }

    /// Create a terminal node (leaf or leaf-list entry) under `parent`,
    /// parsing and canonicalising the lexical value.
    pub fn new_term(
        &mut self,
        parent: Option<DataNodeId>,
        snode: &SchemaNode<'_>,
        value: &str,
    ) -> Result<DataNodeId> {
        let raw = snode.raw();
        let ty = raw.leaf_type().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidData,
                format!("node \"{}\" is not a terminal node", snode.name()),
            )
        })?;
        let stored = store_value(self.context, raw.module, ty, value)
            .map_err(|err| err.with_path(snode.path(
                crate::schema::SchemaPathFormat::DATA,
            )))?;
        self.add_child(parent, snode.id, Some(stored), DnodeFlags::empty())
    }

    // ===== crate-internal node plumbing =====

    pub(crate) fn node(&self, id: DataNodeId) -> &Dnode {
        self.nodes[id.0 as usize].as_ref().expect("stale node id")
    }

    pub(crate) fn node_mut(&mut self, id: DataNodeId) -> &mut Dnode {
        self.nodes[id.0 as usize].as_mut().expect("stale node id")
    }

    pub(crate) fn get_node(&self, id: DataNodeId) -> Option<&Dnode> {
        self.nodes.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    fn alloc(&mut self, dnode: Dnode) -> DataNodeId {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index as usize] = Some(dnode);
                DataNodeId(index)
            }
            None => {
                self.nodes.push(Some(dnode));
                DataNodeId(self.nodes.len() as u32 - 1)
            }
        }
    }

    pub(crate) fn children_of(
        &self,
        parent: Option<DataNodeId>,
    ) -> impl Iterator<Item = DataNodeId> + '_ {
        let first = match parent {
            Some(parent) => self.node(parent).first_child,
            None => self.first_root,
        };
        std::iter::successors(first, move |id| self.node(*id).next)
    }

    pub(crate) fn default_module(&self) -> Result<SchemaModule<'a>> {
        let id = match self.first_root {
            Some(root) => {
                self.context.snodes[self.node(root).schema].module
            }
            None => self
                .context
                .modules_iter()
                .next()
                .ok_or_else(|| {
                    Error::new(ErrorKind::Other, "empty context")
                })?
                .id,
        };
        Ok(SchemaModule {
            context: self.context,
            id,
        })
    }

    fn apply_segment(
        &mut self,
        parent: Option<DataNodeId>,
        segment: &PathSegment<'_>,
        value: Option<&str>,
    ) -> Result<DataNodeId> {
        let context = self.context;
        // Resolve the schema node.
        let parent_snode = parent.map(|id| self.node(id).schema);
        let local_module = match parent_snode {
            Some(snode) => context.snodes[snode].module,
            None => {
                let prefix = segment.prefix.ok_or_else(|| {
                    Error::new(
                        ErrorKind::UnknownModule,
                        "top-level path segment requires a module prefix",
                    )
                })?;
                context.resolve_prefix(
                    context.modules_iter().next().ok_or_else(|| {
                        Error::new(ErrorKind::Other, "empty context")
                    })?
                    .id,
                    prefix,
                ).ok_or_else(|| {
                    Error::new(
                        ErrorKind::UnknownModule,
                        format!("unknown module \"{}\"", prefix),
                    )
                })?
            }
        };
        let module = match segment.prefix {
            Some(prefix) => {
                context.resolve_prefix(local_module, prefix).ok_or_else(
                    || {
                        Error::new(
                            ErrorKind::UnknownModule,
                            format!("unknown module \"{}\"", prefix),
                        )
                    },
                )?
            }
            None => local_module,
        };
        let snode = context
            .data_children(parent_snode, module, false)
            .into_iter()
            .find(|id| {
                let snode = &context.snodes[*id];
                snode.module == module
                    && context.resolve(snode.name) == segment.name
            })
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("schema node \"{}\" not found", segment.name),
                )
            })?;

        let kind = context.snodes[snode].kind;
        match kind {
            SchemaNodeKind::List => {
                // Find an existing instance matching the key predicates.
                if let Some(existing) =
                    self.find_list_instance(parent, snode, &segment.keys)
                {
                    return Ok(existing);
                }
                let instance =
                    self.add_child(parent, snode, None, DnodeFlags::empty())?;
                // Materialise the keys in schema order.
                let keys = match &context.snodes[snode].payload {
                    SnodePayload::List(list) => list.keys.clone(),
                    _ => Vec::new(),
                };
                for key in keys {
                    let key_name = context.resolve(context.snodes[key].name);
                    let key_value = segment
                        .keys
                        .iter()
                        .find(|(name, _)| *name == key_name)
                        .map(|(_, value)| value.as_str())
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::ListKey,
                                format!(
                                    "missing key \"{}\" in path predicate",
                                    key_name
                                ),
                            )
                        })?;
                    let snode_ref = SchemaNode::new(context, key);
                    self.new_term(Some(instance), &snode_ref, key_value)?;
                }
                Ok(instance)
            }
            SchemaNodeKind::Leaf => {
                let snode_ref = SchemaNode::new(context, snode);
                // Replace the value of an existing leaf instance.
                let existing_leaf = self
                    .children_of(parent)
                    .find(|id| self.node(*id).schema == snode);
                if let Some(existing) = existing_leaf {
                    if let Some(value) = value {
                        let raw = snode_ref.raw();
                        let stored = store_value(
                            context,
                            raw.module,
                            raw.leaf_type().unwrap(),
                            value,
                        )?;
                        let node = self.node_mut(existing);
                        node.value = Some(stored);
                        node.flags.remove(DnodeFlags::DEFAULT);
                    }
                    return Ok(existing);
                }
                self.new_term(parent, &snode_ref, value.unwrap_or(""))
            }
            SchemaNodeKind::LeafList => {
                let snode_ref = SchemaNode::new(context, snode);
                self.new_term(parent, &snode_ref, value.unwrap_or(""))
            }
            _ => {
                // Inner nodes are single-instance: reuse when present.
                if let Some(existing) = self
                    .children_of(parent)
                    .find(|id| self.node(*id).schema == snode)
                {
                    return Ok(existing);
                }
                self.add_child(parent, snode, None, DnodeFlags::empty())
            }
        }
    }

    pub(crate) fn find_list_instance(
        &self,
        parent: Option<DataNodeId>,
        snode: SnodeId,
        keys: &[(&str, String)],
    ) -> Option<DataNodeId> {
        self.children_of(parent)
            .filter(|id| self.node(*id).schema == snode)
            .find(|id| {
                keys.iter().all(|(name, value)| {
                    self.children_of(Some(*id)).any(|child| {
                        let child_node = self.node(child);
                        let child_snode =
                            &self.context.snodes[child_node.schema];
                        self.context.resolve(child_snode.name) == *name
                            && child_node
                                .value
                                .as_ref()
                                .is_some_and(|v| v.canonical == *value)
                    })
                })
            })
    }

    /// Insert a node under `parent` (or as a tree root). Keys are kept
    /// first and in schema order; under strict options an out-of-order
    /// key insertion is rejected instead of reordered.
    pub(crate) fn add_child(
        &mut self,
        parent: Option<DataNodeId>,
        snode: SnodeId,
        value: Option<StoredValue>,
        flags: DnodeFlags,
    ) -> Result<DataNodeId> {
        let context = self.context;
        let sdata = &context.snodes[snode];

        // Single-instance nodes must not be duplicated.
        if !matches!(
            sdata.kind,
            SchemaNodeKind::List | SchemaNodeKind::LeafList
        ) {
            if let Some(existing) = self
                .children_of(parent)
                .find(|id| self.node(*id).schema == snode)
            {
                if sdata.kind == SchemaNodeKind::Leaf {
                    return Err(Error::new_path(
                        ErrorKind::DuplicateInstance,
                        format!(
                            "duplicate instance of \"{}\"",
                            context.resolve(sdata.name)
                        ),
                        self.noderef(existing).path(),
                    ));
                }
                return Ok(existing);
            }
        }

        // Work out the insertion point first: keys stay in front, in key
        // order. A key that would land anywhere else arrived out of
        // document order.
        let key_index = |snode_id: SnodeId| -> Option<usize> {
            let parent = context.snodes[snode_id].parent?;
            match &context.snodes[parent].payload {
                SnodePayload::List(list) => {
                    list.keys.iter().position(|key| *key == snode_id)
                }
                _ => None,
            }
        };
        let my_key = if sdata.flags.contains(SchemaFlags::KEY) {
            key_index(snode)
        } else {
            None
        };

        let mut insert_before = None;
        if let Some(my_index) = my_key {
            for sibling in self.children_of(parent) {
                match key_index(self.node(sibling).schema) {
                    Some(index) if index < my_index => continue,
                    _ => {
                        insert_before = Some(sibling);
                        break;
                    }
                }
            }
            if insert_before.is_some() {
                if self.options.contains(DataParserFlags::STRICT) {
                    return Err(Error::new(
                        ErrorKind::ListKey,
                        format!(
                            "list key \"{}\" is out of order",
                            context.resolve(sdata.name)
                        ),
                    ));
                }
                context.warn(
                    &format!(
                        "list key \"{}\" out of order, reordering",
                        context.resolve(sdata.name)
                    ),
                    None,
                );
            }
        }

        let id = self.alloc(Dnode {
            schema: snode,
            parent,
            prev: None,
            next: None,
            first_child: None,
            last_child: None,
            flags,
            value,
            target: None,
            meta: Vec::new(),
        });
        match insert_before {
            Some(before) => self.link_before(parent, id, before),
            None => self.link_last(parent, id),
        }
        Ok(id)
    }

    fn link_last(&mut self, parent: Option<DataNodeId>, id: DataNodeId) {
        let (first, last) = match parent {
            Some(parent) => {
                let p = self.node(parent);
                (p.first_child, p.last_child)
            }
            None => {
                let last = std::iter::successors(self.first_root, |id| {
                    self.node(*id).next
                })
                .last();
                (self.first_root, last)
            }
        };
        match last {
            Some(last) => {
                self.node_mut(last).next = Some(id);
                self.node_mut(id).prev = Some(last);
            }
            None => debug_assert!(first.is_none()),
        }
        if first.is_none() {
            match parent {
                Some(parent) => self.node_mut(parent).first_child = Some(id),
                None => self.first_root = Some(id),
            }
        }
        if let Some(parent) = parent {
            self.node_mut(parent).last_child = Some(id);
        }
    }

    fn link_before(
        &mut self,
        parent: Option<DataNodeId>,
        id: DataNodeId,
        before: DataNodeId,
    ) {
        let prev = self.node(before).prev;
        self.node_mut(id).prev = prev;
        self.node_mut(id).next = Some(before);
        self.node_mut(before).prev = Some(id);
        match prev {
            Some(prev) => self.node_mut(prev).next = Some(id),
            None => match parent {
                Some(parent) => {
                    self.node_mut(parent).first_child = Some(id)
                }
                None => self.first_root = Some(id),
            },
        }
    }

    /// Unlink a node from its parent and free its whole subtree.
    pub(crate) fn unlink_subtree(&mut self, id: DataNodeId) {
        let (parent, prev, next) = {
            let node = self.node(id);
            (node.parent, node.prev, node.next)
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => match parent {
                Some(parent) => self.node_mut(parent).first_child = next,
                None => self.first_root = next,
            },
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).last_child = prev;
                }
            }
        }
        self.free_subtree(id);
    }

    fn free_subtree(&mut self, id: DataNodeId) {
        let mut child = self.node(id).first_child;
        while let Some(next) = child {
            let following = self.node(next).next;
            self.free_subtree(next);
            child = following;
        }
        self.nodes[id.0 as usize] = None;
        self.free.push(id.0);
    }

    /// Attach a metadata attribute to a node.
    pub fn new_meta(
        &mut self,
        node: DataNodeId,
        module: Option<&str>,
        name: &str,
        value: &str,
    ) {
        self.node_mut(node).meta.push(MetaAttr {
            module: module.map(str::to_string),
            name: name.to_string(),
            value: value.to_string(),
        });
    }
}

impl<'a> Data<'a> for DataTree<'a> {
    fn tree(&self) -> &DataTree<'a> {
        self
    }

    fn eval_context(&self) -> Option<DataNodeId> {
        None
    }
}

// ===== impl DataNodeRef =====

impl<'a> DataNodeRef<'a> {
    pub(crate) fn raw(&self) -> &'a Dnode {
        self.tree.node(self.id)
    }

    /// The id of this node, usable with [`DataTree::noderef`].
    pub fn id(&self) -> DataNodeId {
        self.id
    }

    /// Schema definition of the data node.
    pub fn schema(&self) -> SchemaNode<'a> {
        SchemaNode::new(self.tree.context, self.raw().schema)
    }

    /// Returns an iterator over the ancestor data nodes.
    pub fn ancestors(&self) -> Ancestors<'a, DataNodeRef<'a>> {
        Ancestors::new(self.parent())
    }

    /// Returns an iterator over this data node and its ancestors.
    pub fn inclusive_ancestors(&self) -> Ancestors<'a, DataNodeRef<'a>> {
        Ancestors::new(Some(self.clone()))
    }

    /// Returns an iterator over the sibling data nodes.
    pub fn siblings(&self) -> Siblings<'a, DataNodeRef<'a>> {
        Siblings::new(self.next_sibling())
    }

    /// Returns an iterator over this data node and its siblings.
    pub fn inclusive_siblings(&self) -> Siblings<'a, DataNodeRef<'a>> {
        Siblings::new(Some(self.clone()))
    }

    /// Returns an iterator over the child data nodes.
    pub fn children(&self) -> Siblings<'a, DataNodeRef<'a>> {
        Siblings::new(self.first_child())
    }

    /// Returns an iterator over all elements in the data tree (depth-first
    /// search algorithm).
    pub fn traverse(&self) -> Traverse<'a, DataNodeRef<'a>> {
        Traverse::new(self.clone())
    }

    /// Returns an iterator over the keys of the list instance.
    pub fn list_keys(&self) -> impl Iterator<Item = DataNodeRef<'a>> {
        self.children().filter(|dnode| dnode.schema().is_list_key())
    }

    /// Returns an iterator over the metadata attached to the node.
    pub fn meta(&self) -> MetadataList<'a> {
        let first = (!self.raw().meta.is_empty()).then(|| Metadata {
            tree: self.tree,
            node: self.id,
            index: 0,
        });
        MetadataList::new(first)
    }

    /// Generate the data path of the node, including list keys.
    pub fn path(&self) -> String {
        let mut segments = Vec::new();
        for dnode in self.inclusive_ancestors() {
            let snode = dnode.schema();
            let qualify = match dnode.parent() {
                Some(parent) => {
                    parent.schema().raw().module != snode.raw().module
                }
                None => true,
            };
            let mut segment = if qualify {
                format!("{}:{}", snode.module().name(), snode.name())
            } else {
                snode.name().to_string()
            };
            match snode.kind() {
                SchemaNodeKind::List => {
                    for key in dnode.list_keys() {
                        segment.push_str(&format!(
                            "[{}='{}']",
                            key.schema().name(),
                            key.value_canonical().unwrap_or_default()
                        ));
                    }
                }
                SchemaNodeKind::LeafList => {
                    segment.push_str(&format!(
                        "[.='{}']",
                        dnode.value_canonical().unwrap_or_default()
                    ));
                }
                _ => (),
            }
            segments.push(segment);
        }
        let mut path = String::new();
        for segment in segments.iter().rev() {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Returns the canonical string value of the node.
    pub fn value_canonical(&self) -> Option<String> {
        self.raw()
            .value
            .as_ref()
            .map(|value| value.canonical.clone())
    }

    /// Returns the typed value of the node.
    pub fn value(&self) -> Option<DataValue> {
        self.raw().value.as_ref().map(|value| value.value.clone())
    }

    /// Returns whether the node was created through default
    /// materialisation.
    pub fn is_default(&self) -> bool {
        self.raw().flags.contains(DnodeFlags::DEFAULT)
    }

    /// The data node a validated leafref or instance-identifier resolved
    /// to, if any.
    pub fn leafref_target(&self) -> Option<DataNodeRef<'a>> {
        self.raw().target.map(|id| DataNodeRef {
            tree: self.tree,
            id,
        })
    }
}

impl<'a> NodeIterable<'a> for DataNodeRef<'a> {
    fn parent(&self) -> Option<DataNodeRef<'a>> {
        self.raw().parent.map(|id| DataNodeRef {
            tree: self.tree,
            id,
        })
    }

    fn next_sibling(&self) -> Option<DataNodeRef<'a>> {
        self.raw().next.map(|id| DataNodeRef {
            tree: self.tree,
            id,
        })
    }

    fn first_child(&self) -> Option<DataNodeRef<'a>> {
        self.raw().first_child.map(|id| DataNodeRef {
            tree: self.tree,
            id,
        })
    }
}

impl<'a> Data<'a> for DataNodeRef<'a> {
    fn tree(&self) -> &DataTree<'a> {
        self.tree
    }

    fn eval_context(&self) -> Option<DataNodeId> {
        Some(self.id)
    }
}

impl PartialEq for DataNodeRef<'_> {
    fn eq(&self, other: &DataNodeRef<'_>) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

// ===== impl Metadata =====

impl<'a> Metadata<'a> {
    fn raw(&self) -> &'a MetaAttr {
        &self.tree.node(self.node).meta[self.index]
    }

    /// Name of the metadata annotation.
    pub fn name(&self) -> &'a str {
        &self.raw().name
    }

    /// Name of the module defining the annotation.
    pub fn module_name(&self) -> Option<&'a str> {
        self.raw().module.as_deref()
    }

    /// Value of the metadata attribute.
    pub fn value(&self) -> &'a str {
        &self.raw().value
    }

    pub(crate) fn next(&self) -> Option<Metadata<'a>> {
        let next = self.index + 1;
        (next < self.tree.node(self.node).meta.len()).then(|| Metadata {
            tree: self.tree,
            node: self.node,
            index: next,
        })
    }
}
