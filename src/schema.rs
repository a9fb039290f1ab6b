//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! YANG schema data.
//!
//! The compiled schema is an arena of tagged nodes owned by the context;
//! [`SchemaModule`] and [`SchemaNode`] are cheap handles borrowing the
//! context. The schema is immutable once [`Context::load_module`] returns,
//! so handles can be copied around and shared freely.
//!
//! [`Context::load_module`]: crate::context::Context::load_module

use bitflags::bitflags;

use crate::arena::{Id, Sym};
use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::iter::{Ancestors, NodeIterable, Set, Siblings, Traverse};
use crate::types::{StoredValue, TypeId, TypeSpec};
use crate::xpath::{eval, XPathExpr, XPathOptions};

pub(crate) type ModuleId = Id<ModuleData>;
pub(crate) type SnodeId = Id<Snode>;
pub(crate) type IdentityId = Id<IdentityDef>;

/// Status of a definition.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Status {
    #[default]
    Current,
    Deprecated,
    Obsolete,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub(crate) struct SchemaFlags: u32 {
        const CONFIG_W = 0x0001;
        const CONFIG_R = 0x0002;
        const MAND_TRUE = 0x0004;
        const PRESENCE = 0x0008;
        const KEY = 0x0010;
        const KEYLESS = 0x0020;
        const ORDBY_USER = 0x0040;
        const SET_DFLT = 0x0080;
        const IS_INPUT = 0x0100;
        const IS_OUTPUT = 0x0200;
        const IS_NOTIF = 0x0400;
        /// A `when`/`must` on this node references configuration nodes.
        const XPATH_DEP_CONFIG = 0x0800;
        /// A `when`/`must` on this node references state nodes.
        const XPATH_DEP_STATE = 0x1000;
    }
}

/// Compiled module data, owned by the context.
#[derive(Clone, Debug)]
pub(crate) struct ModuleData {
    pub name: Sym,
    pub namespace: Sym,
    pub prefix: Sym,
    /// Revisions sorted newest first; the first one is the effective
    /// revision.
    pub revisions: Vec<Sym>,
    pub imports: Vec<Import>,
    pub implemented: bool,
    pub organization: Option<Sym>,
    pub contact: Option<Sym>,
    pub description: Option<Sym>,
    pub reference: Option<Sym>,
    pub features: Vec<Feature>,
    pub identities: Vec<IdentityId>,
    pub typedefs: Vec<(Sym, TypeId)>,
    /// Grouping templates, kept in declared form: they are never
    /// instantiated directly, only deep-copied by `uses` expansion.
    pub groupings: Vec<crate::builder::GroupingDecl>,
    pub data: Option<SnodeId>,
    pub rpcs: Option<SnodeId>,
    pub notifications: Option<SnodeId>,
}

#[derive(Clone, Debug)]
pub(crate) struct Import {
    pub prefix: Sym,
    pub module: ModuleId,
}

#[derive(Clone, Debug)]
pub(crate) struct Feature {
    pub name: Sym,
    pub status: Status,
    pub enabled: bool,
}

/// Compiled identity.
#[derive(Debug)]
pub(crate) struct IdentityDef {
    pub module: ModuleId,
    pub name: Sym,
    pub status: Status,
    pub bases: Vec<IdentityId>,
    /// Transitive set of identities derived from this one, memoised for
    /// `derived-from-or-self`.
    pub derived: Vec<IdentityId>,
}

/// Compiled schema node.
#[derive(Clone, Debug)]
pub(crate) struct Snode {
    pub kind: SchemaNodeKind,
    pub name: Sym,
    pub module: ModuleId,
    pub parent: Option<SnodeId>,
    pub prev: Option<SnodeId>,
    pub next: Option<SnodeId>,
    pub first_child: Option<SnodeId>,
    pub flags: SchemaFlags,
    pub status: Status,
    pub description: Option<Sym>,
    pub reference: Option<Sym>,
    pub whens: Vec<WhenSpec>,
    pub musts: Vec<MustSpec>,
    pub exts: Vec<ExtInstance>,
    /// Name of the grouping this node was expanded from, for diagnostics.
    pub template: Option<Sym>,
    pub payload: SnodePayload,
}

#[derive(Clone, Debug)]
pub(crate) enum SnodePayload {
    Container { presence: bool },
    List(ListPayload),
    Leaf(LeafPayload),
    LeafList(LeafListPayload),
    Choice { default_case: Option<SnodeId> },
    Case,
    AnyData,
    AnyXml,
    Rpc,
    Action,
    Input,
    Output,
    Notification,
}

#[derive(Clone, Debug)]
pub(crate) struct ListPayload {
    pub keys: Vec<SnodeId>,
    pub uniques: Vec<Vec<SnodeId>>,
    pub min: u32,
    pub max: u32,
}

#[derive(Clone, Debug)]
pub(crate) struct LeafPayload {
    pub ty: TypeId,
    pub default: Option<StoredValue>,
    pub units: Option<Sym>,
}

#[derive(Clone, Debug)]
pub(crate) struct LeafListPayload {
    pub ty: TypeId,
    pub defaults: Vec<StoredValue>,
    pub min: u32,
    pub max: u32,
    pub units: Option<Sym>,
}

/// Compiled `must` restriction.
#[derive(Clone, Debug)]
pub(crate) struct MustSpec {
    pub expr: XPathExpr,
    /// Module providing prefix resolution for the expression.
    pub module: ModuleId,
    pub emsg: Option<Sym>,
    pub eapptag: Option<Sym>,
    pub description: Option<Sym>,
    pub reference: Option<Sym>,
}

/// Compiled `when` condition.
#[derive(Clone, Debug)]
pub(crate) struct WhenSpec {
    pub expr: XPathExpr,
    pub module: ModuleId,
    /// Whether the XPath context is the parent of the data node instead
    /// of the node itself (`when` inherited from a `uses`/`augment` or
    /// hosted on a choice/case).
    pub ctx_is_parent: bool,
    pub description: Option<Sym>,
    pub reference: Option<Sym>,
}

/// Extension instance attached to a schema node.
#[derive(Clone, Debug)]
pub(crate) struct ExtInstance {
    /// Name of the module defining the extension.
    pub def_module: Sym,
    pub name: Sym,
    pub revision: Option<Sym>,
    pub argument: Option<Sym>,
}

/// Schema path format.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SchemaPathFormat {
    /// Descriptive path format used in log messages.
    LOG,
    /// Similar to LOG except that schema-only nodes (choice, case) are
    /// skipped.
    DATA,
}

/// Available YANG schema tree structures representing YANG module.
#[derive(Clone, Debug)]
pub struct SchemaModule<'a> {
    pub(crate) context: &'a Context,
    pub(crate) id: ModuleId,
}

/// Generic YANG schema node.
#[derive(Clone, Debug)]
pub struct SchemaNode<'a> {
    pub(crate) context: &'a Context,
    pub(crate) id: SnodeId,
}

/// YANG schema node kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchemaNodeKind {
    Container,
    Case,
    Choice,
    Leaf,
    LeafList,
    List,
    AnyData,
    AnyXml,
    Rpc,
    Input,
    Output,
    Action,
    Notification,
}

/// YANG must substatement.
#[derive(Clone, Debug)]
pub struct SchemaStmtMust<'a> {
    context: &'a Context,
    snode: SnodeId,
    index: usize,
}

/// YANG when substatement.
#[derive(Clone, Debug)]
pub struct SchemaStmtWhen<'a> {
    context: &'a Context,
    snode: SnodeId,
    index: usize,
}

/// YANG extension instance attached to a schema node.
#[derive(Clone, Debug)]
pub struct SchemaExtInstance<'a> {
    context: &'a Context,
    snode: SnodeId,
    index: usize,
}

/// YANG leaf(-list) type.
#[derive(Clone, Debug)]
pub struct SchemaLeafType<'a> {
    pub(crate) context: &'a Context,
    pub(crate) id: TypeId,
}

/// YANG data value type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DataValueType {
    Unknown = 0,
    Binary = 1,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    String = 6,
    Bits = 7,
    Bool = 8,
    Dec64 = 9,
    Empty = 10,
    Enum = 11,
    IdentityRef = 12,
    InstanceId = 13,
    LeafRef = 14,
    Union = 15,
    Int8 = 16,
    Int16 = 17,
    Int32 = 18,
    Int64 = 19,
}

/// YANG data value.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    Empty,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Other(String),
}

// ===== impl Snode =====

impl Snode {
    pub(crate) fn leaf_type(&self) -> Option<TypeId> {
        match &self.payload {
            SnodePayload::Leaf(leaf) => Some(leaf.ty),
            SnodePayload::LeafList(leaflist) => Some(leaflist.ty),
            _ => None,
        }
    }

    pub(crate) fn min_elements(&self) -> u32 {
        match &self.payload {
            SnodePayload::List(list) => list.min,
            SnodePayload::LeafList(leaflist) => leaflist.min,
            _ => 0,
        }
    }

    pub(crate) fn max_elements(&self) -> u32 {
        match &self.payload {
            SnodePayload::List(list) => list.max,
            SnodePayload::LeafList(leaflist) => leaflist.max,
            _ => u32::MAX,
        }
    }

    /// Whether instances of this node appear in data trees. Choice/case
    /// nodes and operation input/output envelopes do not; their children
    /// attach to the nearest data ancestor.
    pub(crate) fn is_data_node(&self) -> bool {
        !matches!(
            self.kind,
            SchemaNodeKind::Choice
                | SchemaNodeKind::Case
                | SchemaNodeKind::Input
                | SchemaNodeKind::Output
        )
    }
}

// ===== impl SchemaModule =====

impl<'a> SchemaModule<'a> {
    pub(crate) fn data(&self) -> &'a ModuleData {
        &self.context.modules[self.id]
    }

    /// Name of the module.
    pub fn name(&self) -> &str {
        self.context.resolve(self.data().name)
    }

    /// Latest revision of the module.
    pub fn revision(&self) -> Option<&str> {
        self.data()
            .revisions
            .first()
            .map(|rev| self.context.resolve(*rev))
    }

    /// All revisions of the module, sorted newest first.
    pub fn revisions(&self) -> impl Iterator<Item = &str> {
        self.data()
            .revisions
            .iter()
            .map(|rev| self.context.resolve(*rev))
    }

    /// Namespace of the module.
    pub fn namespace(&self) -> &str {
        self.context.resolve(self.data().namespace)
    }

    /// Prefix of the module.
    pub fn prefix(&self) -> &str {
        self.context.resolve(self.data().prefix)
    }

    /// Party/company responsible for the module.
    pub fn organization(&self) -> Option<&str> {
        self.data()
            .organization
            .map(|sym| self.context.resolve(sym))
    }

    /// Contact information for the module.
    pub fn contact(&self) -> Option<&str> {
        self.data().contact.map(|sym| self.context.resolve(sym))
    }

    /// Description of the module.
    pub fn description(&self) -> Option<&str> {
        self.data().description.map(|sym| self.context.resolve(sym))
    }

    /// Cross-reference for the module.
    pub fn reference(&self) -> Option<&str> {
        self.data().reference.map(|sym| self.context.resolve(sym))
    }

    /// Return true if the module is implemented, not just imported.
    pub fn is_implemented(&self) -> bool {
        self.data().implemented
    }

    /// Get the current real status of the specified feature in the module.
    pub fn feature_value(&self, feature: &str) -> Result<bool> {
        self.data()
            .features
            .iter()
            .find(|f| self.context.resolve(f.name) == feature)
            .map(|f| f.enabled)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!(
                        "feature \"{}\" not defined in module \"{}\"",
                        feature,
                        self.name()
                    ),
                )
            })
    }

    /// Returns an iterator over the top-level data nodes.
    pub fn data_nodes(&self) -> Siblings<'a, SchemaNode<'a>> {
        let first = self.data().data.map(|id| SchemaNode {
            context: self.context,
            id,
        });
        Siblings::new(first)
    }

    /// Returns an iterator over the list of RPCs.
    pub fn rpcs(&self) -> Siblings<'a, SchemaNode<'a>> {
        let first = self.data().rpcs.map(|id| SchemaNode {
            context: self.context,
            id,
        });
        Siblings::new(first)
    }

    /// Returns an iterator over the list of notifications.
    pub fn notifications(&self) -> Siblings<'a, SchemaNode<'a>> {
        let first = self.data().notifications.map(|id| SchemaNode {
            context: self.context,
            id,
        });
        Siblings::new(first)
    }

    /// Returns an iterator over all nodes in the schema module
    /// (depth-first search algorithm).
    ///
    /// NOTE: augmentations (from other modules or from the module itself)
    /// are also iterated over.
    pub fn traverse(&self) -> impl Iterator<Item = SchemaNode<'a>> {
        let data = self.data_nodes().flat_map(|snode| snode.traverse());
        let rpcs = self.rpcs().flat_map(|snode| snode.traverse());
        let notifications =
            self.notifications().flat_map(|snode| snode.traverse());
        data.chain(rpcs).chain(notifications)
    }
}

impl PartialEq for SchemaModule<'_> {
    fn eq(&self, other: &SchemaModule<'_>) -> bool {
        std::ptr::eq(self.context, other.context) && self.id == other.id
    }
}

// ===== impl SchemaNode =====

impl<'a> SchemaNode<'a> {
    pub(crate) fn new(context: &'a Context, id: SnodeId) -> SchemaNode<'a> {
        SchemaNode { context, id }
    }

    pub(crate) fn raw(&self) -> &'a Snode {
        &self.context.snodes[self.id]
    }

    fn check_flag(&self, flag: SchemaFlags) -> bool {
        self.raw().flags.contains(flag)
    }

    /// Schema node module.
    pub fn module(&self) -> SchemaModule<'a> {
        SchemaModule {
            context: self.context,
            id: self.raw().module,
        }
    }

    /// Returns the kind of the schema node.
    pub fn kind(&self) -> SchemaNodeKind {
        self.raw().kind
    }

    /// Schema node name.
    pub fn name(&self) -> &'a str {
        self.context.resolve(self.raw().name)
    }

    /// Description statement.
    pub fn description(&self) -> Option<&'a str> {
        self.raw().description.map(|sym| self.context.resolve(sym))
    }

    /// Reference statement.
    pub fn reference(&self) -> Option<&'a str> {
        self.raw().reference.map(|sym| self.context.resolve(sym))
    }

    /// Generate path of the node.
    pub fn path(&self, format: SchemaPathFormat) -> String {
        let mut segments = Vec::new();
        for snode in self.inclusive_ancestors() {
            if format == SchemaPathFormat::DATA && snode.is_schema_only() {
                continue;
            }
            let qualify = match snode.parent() {
                Some(parent) => parent.raw().module != snode.raw().module,
                None => true,
            };
            let segment = if qualify {
                format!("{}:{}", snode.module().name(), snode.name())
            } else {
                snode.name().to_string()
            };
            segments.push(segment);
        }
        let mut path = String::new();
        for segment in segments.iter().rev() {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Evaluate an xpath expression on the node, returning the matching
    /// schema nodes.
    pub fn find_xpath(&self, xpath: &str) -> Result<Set<'a, SchemaNode<'a>>> {
        let expr = XPathExpr::compile(xpath)?;
        let snodes = eval::find_schema_nodes(
            self.context,
            &expr,
            Some(self.id),
            self.raw().module,
            XPathOptions::SNODE,
        )?;
        Ok(Set::new(
            snodes
                .into_iter()
                .map(move |id| SchemaNode::new(self.context, id))
                .collect(),
        ))
    }

    /// Get a single schema node based on the given data path.
    pub fn find_path(&self, path: &str) -> Result<SchemaNode<'a>> {
        let mut set = self.find_xpath(path)?;
        let first = set.next().ok_or_else(|| {
            Error::new_path(
                ErrorKind::UnresolvedReference,
                "no node found for path",
                path,
            )
        })?;
        if set.next().is_some() {
            return Err(Error::new_path(
                ErrorKind::Other,
                "path matches more than one node",
                path,
            ));
        }
        Ok(first)
    }

    /// Compute the static schema-node dependency set of an expression
    /// evaluated with this node as context.
    pub fn atomize(
        &self,
        expr: &XPathExpr,
        options: XPathOptions,
    ) -> Result<Vec<SchemaNode<'a>>> {
        let deps = eval::atomize(
            self.context,
            expr,
            Some(self.id),
            self.raw().module,
            options | XPathOptions::SNODE,
        )?;
        Ok(deps
            .into_iter()
            .map(|id| SchemaNode::new(self.context, id))
            .collect())
    }

    /// Returns whether the node is a configuration node.
    pub fn is_config(&self) -> bool {
        self.check_flag(SchemaFlags::CONFIG_W)
    }

    /// Returns whether the node is a state node.
    pub fn is_state(&self) -> bool {
        self.check_flag(SchemaFlags::CONFIG_R)
    }

    /// Returns whether the node's status is "current".
    pub fn is_status_current(&self) -> bool {
        self.raw().status == Status::Current
    }

    /// Returns whether the node's status is "deprecated".
    pub fn is_status_deprecated(&self) -> bool {
        self.raw().status == Status::Deprecated
    }

    /// Returns whether the node's status is "obsolete".
    pub fn is_status_obsolete(&self) -> bool {
        self.raw().status == Status::Obsolete
    }

    /// Returns whether the node is mandatory.
    pub fn is_mandatory(&self) -> bool {
        self.check_flag(SchemaFlags::MAND_TRUE)
    }

    /// Returns whether the node is a non-presence container.
    pub fn is_np_container(&self) -> bool {
        matches!(
            self.raw().payload,
            SnodePayload::Container { presence: false }
        )
    }

    /// Returns whether the node is a list's key.
    pub fn is_list_key(&self) -> bool {
        self.check_flag(SchemaFlags::KEY)
    }

    /// Returns whether the node is a keyless list.
    pub fn is_keyless_list(&self) -> bool {
        self.check_flag(SchemaFlags::KEYLESS)
    }

    /// Returns whether the node is an user-ordered list or leaf-list.
    pub fn is_user_ordered(&self) -> bool {
        self.check_flag(SchemaFlags::ORDBY_USER)
    }

    /// Returns whether the node appears only in the schema tree and not in
    /// the data tree.
    pub fn is_schema_only(&self) -> bool {
        matches!(self.kind(), SchemaNodeKind::Choice | SchemaNodeKind::Case)
    }

    /// Returns whether the node is in the subtree of an input statement.
    pub fn is_within_input(&self) -> bool {
        self.check_flag(SchemaFlags::IS_INPUT)
    }

    /// Returns whether the node is in the subtree of an output statement.
    pub fn is_within_output(&self) -> bool {
        self.check_flag(SchemaFlags::IS_OUTPUT)
    }

    /// Returns whether the node is in the subtree of a notification
    /// statement.
    pub fn is_within_notification(&self) -> bool {
        self.check_flag(SchemaFlags::IS_NOTIF)
    }

    /// Returns whether a `when`/`must` on this node references
    /// configuration nodes, requiring re-validation when configuration
    /// changes.
    pub fn xpath_depends_on_config(&self) -> bool {
        self.check_flag(SchemaFlags::XPATH_DEP_CONFIG)
    }

    /// Returns whether a `when`/`must` on this node references state
    /// nodes.
    pub fn xpath_depends_on_state(&self) -> bool {
        self.check_flag(SchemaFlags::XPATH_DEP_STATE)
    }

    /// Returns whether a default value is set.
    pub fn has_default(&self) -> bool {
        self.check_flag(SchemaFlags::SET_DFLT)
    }

    /// The default value of the leaf (canonical string representation).
    pub fn default_value_canonical(&self) -> Option<&'a str> {
        match &self.raw().payload {
            SnodePayload::Leaf(leaf) => {
                leaf.default.as_ref().map(|dflt| dflt.canonical.as_str())
            }
            _ => None,
        }
    }

    /// The default value of the leaf (typed representation).
    pub fn default_value(&self) -> Option<DataValue> {
        match &self.raw().payload {
            SnodePayload::Leaf(leaf) => {
                leaf.default.as_ref().map(|dflt| dflt.value.clone())
            }
            _ => None,
        }
    }

    /// The default values of the leaf-list (canonical string
    /// representations).
    pub fn default_values_canonical(
        &self,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let defaults = match &self.raw().payload {
            SnodePayload::LeafList(leaflist) => leaflist.defaults.as_slice(),
            _ => &[],
        };
        defaults.iter().map(|dflt| dflt.canonical.as_str())
    }

    /// The default case of the choice.
    pub fn default_case(&self) -> Option<SchemaNode<'a>> {
        match self.raw().payload {
            SnodePayload::Choice { default_case } => default_case
                .map(|id| SchemaNode::new(self.context, id)),
            _ => None,
        }
    }

    /// Type of the leaf(-list) node.
    pub fn leaf_type(&self) -> Option<SchemaLeafType<'a>> {
        self.raw().leaf_type().map(|id| SchemaLeafType {
            context: self.context,
            id,
        })
    }

    /// Units of the leaf(-list)'s type.
    pub fn units(&self) -> Option<&'a str> {
        let units = match &self.raw().payload {
            SnodePayload::Leaf(leaf) => leaf.units,
            SnodePayload::LeafList(leaflist) => leaflist.units,
            _ => None,
        };
        units.map(|sym| self.context.resolve(sym))
    }

    /// The min-elements constraint.
    pub fn min_elements(&self) -> Option<u32> {
        match self.raw().min_elements() {
            0 => None,
            min => Some(min),
        }
    }

    /// The max-elements constraint.
    pub fn max_elements(&self) -> Option<u32> {
        match self.raw().max_elements() {
            u32::MAX => None,
            max => Some(max),
        }
    }

    /// Array of must restrictions.
    pub fn musts(&self) -> impl Iterator<Item = SchemaStmtMust<'a>> + 'a {
        let context = self.context;
        let snode = self.id;
        (0..self.raw().musts.len()).map(move |index| SchemaStmtMust {
            context,
            snode,
            index,
        })
    }

    /// Array of when statements.
    pub fn whens(&self) -> impl Iterator<Item = SchemaStmtWhen<'a>> + 'a {
        let context = self.context;
        let snode = self.id;
        (0..self.raw().whens.len()).map(move |index| SchemaStmtWhen {
            context,
            snode,
            index,
        })
    }

    /// Array of extension instances.
    pub fn extensions(
        &self,
    ) -> impl Iterator<Item = SchemaExtInstance<'a>> + 'a {
        let context = self.context;
        let snode = self.id;
        (0..self.raw().exts.len()).map(move |index| SchemaExtInstance {
            context,
            snode,
            index,
        })
    }

    /// RPC or action input node.
    pub fn input(&self) -> Option<SchemaNode<'a>> {
        match self.kind() {
            SchemaNodeKind::Rpc | SchemaNodeKind::Action => self
                .children()
                .find(|snode| snode.kind() == SchemaNodeKind::Input),
            _ => None,
        }
    }

    /// RPC or action output node.
    pub fn output(&self) -> Option<SchemaNode<'a>> {
        match self.kind() {
            SchemaNodeKind::Rpc | SchemaNodeKind::Action => self
                .children()
                .find(|snode| snode.kind() == SchemaNodeKind::Output),
            _ => None,
        }
    }

    /// Returns an iterator over the ancestor schema nodes.
    pub fn ancestors(&self) -> Ancestors<'a, SchemaNode<'a>> {
        Ancestors::new(self.parent())
    }

    /// Returns an iterator over this schema node and its ancestors.
    pub fn inclusive_ancestors(&self) -> Ancestors<'a, SchemaNode<'a>> {
        Ancestors::new(Some(self.clone()))
    }

    /// Returns an iterator over the sibling schema nodes.
    pub fn siblings(&self) -> Siblings<'a, SchemaNode<'a>> {
        Siblings::new(self.next_sibling())
    }

    /// Returns an iterator over this schema node and its siblings.
    pub fn inclusive_siblings(&self) -> Siblings<'a, SchemaNode<'a>> {
        Siblings::new(Some(self.clone()))
    }

    /// Returns an iterator over the child schema nodes.
    pub fn children(&self) -> Siblings<'a, SchemaNode<'a>> {
        Siblings::new(self.first_child())
    }

    /// Returns an iterator over all elements in the schema tree
    /// (depth-first search algorithm).
    pub fn traverse(&self) -> Traverse<'a, SchemaNode<'a>> {
        Traverse::new(self.clone())
    }

    /// Returns an iterator over the keys of the list.
    pub fn list_keys(&self) -> impl Iterator<Item = SchemaNode<'a>> {
        self.children().filter(|snode| snode.is_list_key())
    }
}

impl<'a> NodeIterable<'a> for SchemaNode<'a> {
    fn parent(&self) -> Option<SchemaNode<'a>> {
        self.raw()
            .parent
            .map(|id| SchemaNode::new(self.context, id))
    }

    fn next_sibling(&self) -> Option<SchemaNode<'a>> {
        self.raw().next.map(|id| SchemaNode::new(self.context, id))
    }

    fn first_child(&self) -> Option<SchemaNode<'a>> {
        self.raw()
            .first_child
            .map(|id| SchemaNode::new(self.context, id))
    }
}

impl PartialEq for SchemaNode<'_> {
    fn eq(&self, other: &SchemaNode<'_>) -> bool {
        std::ptr::eq(self.context, other.context) && self.id == other.id
    }
}

// ===== impl SchemaStmtMust =====

impl SchemaStmtMust<'_> {
    fn raw(&self) -> &MustSpec {
        &self.context.snodes[self.snode].musts[self.index]
    }

    /// XPath condition of the must statement.
    pub fn condition(&self) -> &str {
        // The compiled expression retains its source text.
        let must = self.raw();
        must.expr.text()
    }

    /// description substatement.
    pub fn description(&self) -> Option<&str> {
        self.raw().description.map(|sym| self.context.resolve(sym))
    }

    /// reference substatement.
    pub fn reference(&self) -> Option<&str> {
        self.raw().reference.map(|sym| self.context.resolve(sym))
    }

    /// error-message substatement.
    pub fn error_msg(&self) -> Option<&str> {
        self.raw().emsg.map(|sym| self.context.resolve(sym))
    }

    /// error-app-tag substatement.
    pub fn error_apptag(&self) -> Option<&str> {
        self.raw().eapptag.map(|sym| self.context.resolve(sym))
    }
}

// ===== impl SchemaStmtWhen =====

impl SchemaStmtWhen<'_> {
    fn raw(&self) -> &WhenSpec {
        &self.context.snodes[self.snode].whens[self.index]
    }

    /// XPath condition of the when statement.
    pub fn condition(&self) -> &str {
        self.raw().expr.text()
    }

    /// description substatement.
    pub fn description(&self) -> Option<&str> {
        self.raw().description.map(|sym| self.context.resolve(sym))
    }

    /// reference substatement.
    pub fn reference(&self) -> Option<&str> {
        self.raw().reference.map(|sym| self.context.resolve(sym))
    }
}

// ===== impl SchemaExtInstance =====

impl SchemaExtInstance<'_> {
    pub(crate) fn raw(&self) -> &ExtInstance {
        &self.context.snodes[self.snode].exts[self.index]
    }

    /// Name of the module defining the extension.
    pub fn module_name(&self) -> &str {
        self.context.resolve(self.raw().def_module)
    }

    /// Name of the extension.
    pub fn name(&self) -> &str {
        self.context.resolve(self.raw().name)
    }

    /// Argument of the extension instance, if any.
    pub fn argument(&self) -> Option<&str> {
        self.raw().argument.map(|sym| self.context.resolve(sym))
    }
}

// ===== impl SchemaLeafType =====

impl<'a> SchemaLeafType<'a> {
    /// Returns the resolved base type.
    pub fn base_type(&self) -> DataValueType {
        self.context.types[self.id].base()
    }

    /// Returns the typedef name if it exists.
    pub fn typedef_name(&self) -> Option<String> {
        self.context.types[self.id]
            .name
            .map(|(_, name)| self.context.resolve(name).to_string())
    }

    /// Returns the real type of the leafref, corresponding to the first
    /// non-leafref in a possible chain of leafrefs.
    pub fn leafref_real_type(&self) -> Option<SchemaLeafType<'a>> {
        let mut current = match &self.context.types[self.id].spec {
            TypeSpec::Leafref { real_type, .. } => (*real_type)?,
            _ => return None,
        };
        while let TypeSpec::Leafref { real_type, .. } =
            &self.context.types[current].spec
        {
            current = (*real_type)?;
        }
        Some(SchemaLeafType {
            context: self.context,
            id: current,
        })
    }

    /// The fraction-digits of a decimal64 type.
    pub fn fraction_digits(&self) -> Option<u8> {
        match &self.context.types[self.id].spec {
            TypeSpec::Decimal64 {
                fraction_digits, ..
            } => Some(*fraction_digits),
            _ => None,
        }
    }
}
