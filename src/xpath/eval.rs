//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! XPath evaluation engine.
//!
//! One evaluator serves two modes. In data mode it walks a data tree and
//! produces node-sets, strings, numbers or booleans. In schema mode
//! (`XPathOptions::SNODE`) it walks the schema tree instead, collecting
//! every schema node an expression can reach; the collected set is the
//! expression's static dependency set used by the resolver.
//!
//! The evaluator is driven by the `repeat` annotations of the compiled
//! expression: at each token that starts a sub-expression it descends
//! directly into the outermost precedence level recorded there, so empty
//! grammar levels cost nothing.

use std::collections::{HashMap, HashSet};

use num_traits::FromPrimitive;

use super::{ExprLevel, Token, XPathExpr, XPathOptions};
use crate::arena::Sym;
use crate::context::Context;
use crate::data::{
    parse_data_path, DataNodeId, DataNodeRef, DataTree, DnodeFlags,
};
use crate::error::{Error, ErrorKind, Result};
use crate::schema::{ModuleId, SchemaFlags, SnodeId};
use crate::types::{store_value, TypeSpec};

/// Node-sets above this size get a hash side-index for duplicate
/// elimination; smaller sets use a linear scan.
const DEDUP_THRESHOLD: usize = 8;

/// Result of a data-mode XPath evaluation.
#[derive(Clone, Debug)]
pub enum XPathValue<'a> {
    Boolean(bool),
    Number(f64),
    String(String),
    Nodes(Vec<DataNodeRef<'a>>),
}

/// Outcome of a boolean (`when`/`must`) evaluation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BoolOutcome {
    True,
    False,
    /// The expression visited a node whose own `when` has not been
    /// decided yet; the validator retries in the next fixpoint round.
    Unresolved,
}

/// Internal evaluation failure: either a real error or the retryable
/// unresolved-when signal, which never leaves the validator.
enum EvalErr {
    Unresolved,
    Other(Error),
}

impl From<Error> for EvalErr {
    fn from(err: Error) -> EvalErr {
        EvalErr::Other(err)
    }
}

type EResult<T> = std::result::Result<T, EvalErr>;

fn real(err: EvalErr) -> Error {
    match err {
        EvalErr::Other(err) => err,
        EvalErr::Unresolved => Error::new(
            ErrorKind::Other,
            "expression depends on an unresolved when condition",
        ),
    }
}

/// One member of a node-set: data items carry a node kind so that a node
/// and its text or metadata are distinct set members.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum Item {
    DRoot,
    DNode(DataNodeId),
    DText(DataNodeId),
    DMeta(DataNodeId, u32),
    SRoot,
    SNode(SnodeId),
}

/// Ordered, duplicate-free node-set with an optional hash side-index.
#[derive(Clone, Debug, Default)]
struct NodeSet {
    items: Vec<Item>,
    index: Option<HashSet<Item>>,
}

impl NodeSet {
    fn singleton(item: Item) -> NodeSet {
        NodeSet {
            items: vec![item],
            index: None,
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert unless already present. Builds the hash index once the set
    /// grows past the threshold.
    fn push_unique(&mut self, item: Item) -> bool {
        match &mut self.index {
            Some(index) => {
                if !index.insert(item) {
                    return false;
                }
            }
            None => {
                if self.items.contains(&item) {
                    return false;
                }
                if self.items.len() >= DEDUP_THRESHOLD {
                    let mut index: HashSet<Item> =
                        self.items.iter().copied().collect();
                    index.insert(item);
                    self.index = Some(index);
                }
            }
        }
        self.items.push(item);
        true
    }
}

#[derive(Clone, Debug)]
enum Val {
    Bool(bool),
    Num(f64),
    Str(String),
    Set(NodeSet),
}

struct Eval<'t> {
    ctx: &'t Context,
    expr: &'t XPathExpr,
    opts: XPathOptions,
    local_module: ModuleId,
    tree: Option<&'t DataTree<'t>>,
    /// Context node of the whole evaluation, returned by `current()`.
    orig: Item,
    /// Current context item, position and size (predicates re-root
    /// these).
    ctx_item: Item,
    ctx_pos: usize,
    ctx_size: usize,
    /// Token cursor.
    pos: usize,
    /// Lazily computed document-order positions of data nodes.
    positions: Option<HashMap<DataNodeId, u32>>,
    /// Schema mode: every schema node the expression touched.
    deps: Vec<SnodeId>,
    deps_seen: HashSet<SnodeId>,
}

// ===== entry points =====

/// Evaluate in data mode, converting the result into the public value
/// type.
pub(crate) fn eval_data<'a>(
    tree: &'a DataTree<'a>,
    expr: &XPathExpr,
    ctx_node: Option<DataNodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> Result<XPathValue<'a>> {
    let val =
        eval_data_raw(tree, expr, ctx_node, local_module, opts).map_err(real)?;
    Ok(match val {
        Val::Bool(b) => XPathValue::Boolean(b),
        Val::Num(n) => XPathValue::Number(n),
        Val::Str(s) => XPathValue::String(s),
        Val::Set(set) => XPathValue::Nodes(
            set.items
                .into_iter()
                .filter_map(|item| match item {
                    Item::DNode(id) | Item::DText(id) => {
                        Some(tree.noderef(id))
                    }
                    _ => None,
                })
                .collect(),
        ),
    })
}

fn eval_data_raw<'t>(
    tree: &'t DataTree<'t>,
    expr: &'t XPathExpr,
    ctx_node: Option<DataNodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> EResult<Val> {
    debug_assert!(!opts.contains(XPathOptions::SNODE));
    let ctx_item = match ctx_node {
        Some(id) => Item::DNode(id),
        None => Item::DRoot,
    };
    let mut eval = Eval {
        ctx: tree.context,
        expr,
        opts,
        local_module,
        tree: Some(tree),
        orig: ctx_item,
        ctx_item,
        ctx_pos: 1,
        ctx_size: 1,
        pos: 0,
        positions: None,
        deps: Vec::new(),
        deps_seen: HashSet::new(),
    };
    eval.eval_at(0)
}

/// Evaluate a boolean condition (`when`/`must`) in data mode.
pub(crate) fn eval_bool(
    tree: &DataTree<'_>,
    expr: &XPathExpr,
    ctx_node: Option<DataNodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> Result<BoolOutcome> {
    match eval_data_raw(tree, expr, ctx_node, local_module, opts) {
        Ok(val) => Ok(if val_to_bool(&val) {
            BoolOutcome::True
        } else {
            BoolOutcome::False
        }),
        Err(EvalErr::Unresolved) => Ok(BoolOutcome::Unresolved),
        Err(EvalErr::Other(err)) => Err(err),
    }
}

/// Evaluate to a set of data node ids (leafref target resolution).
pub(crate) fn eval_node_ids(
    tree: &DataTree<'_>,
    expr: &XPathExpr,
    ctx_node: Option<DataNodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> Result<Vec<DataNodeId>> {
    match eval_data_raw(tree, expr, ctx_node, local_module, opts)
        .map_err(real)?
    {
        Val::Set(set) => Ok(set
            .items
            .into_iter()
            .filter_map(|item| match item {
                Item::DNode(id) => Some(id),
                _ => None,
            })
            .collect()),
        _ => Err(Error::new(
            ErrorKind::TypeMismatch,
            "path expression does not evaluate to a node set",
        )),
    }
}

fn eval_schema_raw(
    ctx: &Context,
    expr: &XPathExpr,
    ctx_snode: Option<SnodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> Result<(Val, Vec<SnodeId>)> {
    let ctx_item = match ctx_snode {
        Some(id) => Item::SNode(id),
        None => Item::SRoot,
    };
    let mut eval = Eval {
        ctx,
        expr,
        opts: opts | XPathOptions::SNODE,
        local_module,
        tree: None,
        orig: ctx_item,
        ctx_item,
        ctx_pos: 1,
        ctx_size: 1,
        pos: 0,
        positions: None,
        deps: Vec::new(),
        deps_seen: HashSet::new(),
    };
    if let Some(id) = ctx_snode {
        eval.record_dep(id);
    }
    let val = eval.eval_at(0).map_err(real)?;
    Ok((val, eval.deps))
}

/// Evaluate in schema mode, returning the final matched schema node set.
pub(crate) fn find_schema_nodes(
    ctx: &Context,
    expr: &XPathExpr,
    ctx_snode: Option<SnodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> Result<Vec<SnodeId>> {
    let (val, _) = eval_schema_raw(ctx, expr, ctx_snode, local_module, opts)?;
    match val {
        Val::Set(set) => Ok(set
            .items
            .into_iter()
            .filter_map(|item| match item {
                Item::SNode(id) => Some(id),
                _ => None,
            })
            .collect()),
        _ => Err(Error::new(
            ErrorKind::TypeMismatch,
            "expression does not evaluate to a node set",
        )),
    }
}

/// Evaluate in schema mode, returning the static dependency set: every
/// schema node the expression can possibly reference.
pub(crate) fn atomize(
    ctx: &Context,
    expr: &XPathExpr,
    ctx_snode: Option<SnodeId>,
    local_module: ModuleId,
    opts: XPathOptions,
) -> Result<Vec<SnodeId>> {
    let (_, deps) = eval_schema_raw(ctx, expr, ctx_snode, local_module, opts)?;
    Ok(deps)
}

/// Resolve an instance-identifier value against a data tree.
pub(crate) fn resolve_instance_id(
    tree: &DataTree<'_>,
    path: &str,
) -> Result<Option<DataNodeId>> {
    let segments = parse_data_path(path)?;
    let ctx = tree.context;
    let mut current: Option<DataNodeId> = None;
    let mut first = true;
    for segment in &segments {
        let local_module = match current {
            Some(id) => ctx.snodes[tree.node(id).schema].module,
            None => match ctx.modules_iter().next() {
                Some(module) => module.id,
                None => return Ok(None),
            },
        };
        let module = match segment.prefix {
            Some(prefix) => match ctx.resolve_prefix(local_module, prefix) {
                Some(module) => module,
                None => return Ok(None),
            },
            None if first => return Ok(None),
            None => local_module,
        };
        let found = tree.children_of(current).find(|id| {
            let node = tree.node(*id);
            let snode = &ctx.snodes[node.schema];
            if snode.module != module
                || ctx.resolve(snode.name) != segment.name
            {
                return false;
            }
            if let Some(value) = &segment.value {
                return node
                    .value
                    .as_ref()
                    .is_some_and(|v| v.canonical == *value);
            }
            segment.keys.iter().all(|(key, value)| {
                tree.children_of(Some(*id)).any(|child| {
                    let child_node = tree.node(child);
                    let child_snode = &ctx.snodes[child_node.schema];
                    ctx.resolve(child_snode.name) == *key
                        && child_node
                            .value
                            .as_ref()
                            .is_some_and(|v| v.canonical == *value)
                })
            })
        });
        match found {
            Some(id) => current = Some(id),
            None => return Ok(None),
        }
        first = false;
    }
    Ok(current)
}

// ===== scalar conversions =====

/// XPath string-to-number: optional sign, digits with an optional
/// fraction. Anything else is NaN.
pub(crate) fn str_to_num(s: &str) -> f64 {
    let t = s.trim();
    let body = t.strip_prefix('-').unwrap_or(t);
    let valid = !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|c| *c == '.').count() <= 1
        && body != ".";
    if valid {
        t.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// XPath number-to-string.
pub(crate) fn num_to_str(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < 1e17 {
        format!("{}", n.trunc() as i64)
    } else {
        format!("{}", n)
    }
}

/// `round()` semantics, including the negative-zero branch: values in
/// `[-0.5, 0)` round to negative zero.
pub(crate) fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) || (n == 0.0 && n.is_sign_negative()) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

fn val_to_bool(val: &Val) -> bool {
    match val {
        Val::Bool(b) => *b,
        Val::Num(n) => *n != 0.0 && !n.is_nan(),
        Val::Str(s) => !s.is_empty(),
        Val::Set(set) => !set.is_empty(),
    }
}

// ===== impl Eval =====

impl<'t> Eval<'t> {
    fn tree(&self) -> &'t DataTree<'t> {
        self.tree.expect("data tree access in schema mode")
    }

    fn schema_mode(&self) -> bool {
        self.opts.contains(XPathOptions::SNODE)
    }

    fn cur(&self) -> Option<Token> {
        self.expr.tokens.get(self.pos).copied()
    }

    fn cur_str(&self) -> &str {
        self.expr.tok_str(self.pos)
    }

    fn error(&self, kind: ErrorKind, msg: &str) -> EvalErr {
        EvalErr::Other(Error::new(
            kind,
            format!("{} in \"{}\"", msg, self.expr.text()),
        ))
    }

    fn record_dep(&mut self, id: SnodeId) {
        if self.deps_seen.insert(id) {
            self.deps.push(id);
        }
    }

    /// Evaluate the sub-expression starting at the current token,
    /// descending into the `ridx`-th precedence level recorded for it.
    fn eval_at(&mut self, ridx: usize) -> EResult<Val> {
        self.ctx.check_cancelled()?;
        let level = self
            .expr
            .repeat
            .get(self.pos)
            .and_then(|levels| levels.get(ridx))
            .map(|raw| ExprLevel::from_u8(*raw).expect("bad repeat level"));
        match level {
            None => self.eval_path_expr(),
            Some(ExprLevel::Or) => {
                let lhs = self.eval_at(ridx + 1)?;
                let mut acc = self.to_bool(&lhs);
                while self.cur() == Some(Token::OperLog)
                    && self.cur_str() == "or"
                {
                    self.pos += 1;
                    let rhs = self.eval_at(0)?;
                    acc = acc || self.to_bool(&rhs);
                }
                Ok(Val::Bool(acc))
            }
            Some(ExprLevel::And) => {
                let lhs = self.eval_at(ridx + 1)?;
                let mut acc = self.to_bool(&lhs);
                while self.cur() == Some(Token::OperLog)
                    && self.cur_str() == "and"
                {
                    self.pos += 1;
                    let rhs = self.eval_at(0)?;
                    acc = acc && self.to_bool(&rhs);
                }
                Ok(Val::Bool(acc))
            }
            Some(ExprLevel::Equality) => {
                let mut lhs = self.eval_at(ridx + 1)?;
                while self.cur() == Some(Token::OperComp)
                    && matches!(self.cur_str(), "=" | "!=")
                {
                    let negate = self.cur_str() == "!=";
                    self.pos += 1;
                    let rhs = self.eval_at(0)?;
                    lhs = Val::Bool(self.compare_eq(&lhs, &rhs, negate)?);
                }
                Ok(lhs)
            }
            Some(ExprLevel::Relational) => {
                let mut lhs = self.eval_at(ridx + 1)?;
                while self.cur() == Some(Token::OperComp)
                    && matches!(self.cur_str(), "<" | "<=" | ">" | ">=")
                {
                    let op = self.cur_str().to_string();
                    self.pos += 1;
                    let rhs = self.eval_at(0)?;
                    lhs = Val::Bool(self.compare_rel(&lhs, &rhs, &op));
                }
                Ok(lhs)
            }
            Some(ExprLevel::Additive) => {
                let lhs = self.eval_at(ridx + 1)?;
                let mut acc = self.to_num(&lhs);
                while self.cur() == Some(Token::OperMath)
                    && matches!(self.cur_str(), "+" | "-")
                {
                    let sub = self.cur_str() == "-";
                    self.pos += 1;
                    let rhs = self.eval_at(0)?;
                    let rhs = self.to_num(&rhs);
                    acc = if sub { acc - rhs } else { acc + rhs };
                }
                Ok(Val::Num(acc))
            }
            Some(ExprLevel::Multiplicative) => {
                let lhs = self.eval_at(ridx + 1)?;
                let mut acc = self.to_num(&lhs);
                while self.cur() == Some(Token::OperMath)
                    && matches!(self.cur_str(), "*" | "div" | "mod")
                {
                    let op = self.cur_str().to_string();
                    self.pos += 1;
                    let rhs = self.eval_at(0)?;
                    let rhs = self.to_num(&rhs);
                    acc = match op.as_str() {
                        "*" => acc * rhs,
                        "div" => acc / rhs,
                        _ => acc % rhs,
                    };
                }
                Ok(Val::Num(acc))
            }
            Some(ExprLevel::Unary) => {
                let mut negate = false;
                while self.cur() == Some(Token::OperMath)
                    && self.cur_str() == "-"
                {
                    negate = !negate;
                    self.pos += 1;
                }
                let operand = self.eval_at(0)?;
                let num = self.to_num(&operand);
                Ok(Val::Num(if negate { -num } else { num }))
            }
            Some(ExprLevel::Union) => {
                let lhs = self.eval_path_expr()?;
                let mut acc = self.into_set(lhs)?;
                while self.cur() == Some(Token::OperUni) {
                    self.pos += 1;
                    let rhs = self.eval_path_expr()?;
                    let rhs = self.into_set(rhs)?;
                    for item in rhs.items {
                        acc.push_unique(item);
                    }
                }
                self.sort_set(&mut acc);
                Ok(Val::Set(acc))
            }
        }
    }

    // ===== path evaluation =====

    fn starts_step(&self) -> bool {
        matches!(
            self.cur(),
            Some(Token::Dot)
                | Some(Token::DotDot)
                | Some(Token::At)
                | Some(Token::NameTest)
                | Some(Token::NodeType)
        )
    }

    fn root_item(&self) -> Item {
        if self.schema_mode() {
            Item::SRoot
        } else {
            Item::DRoot
        }
    }

    fn eval_path_expr(&mut self) -> EResult<Val> {
        match self.cur() {
            Some(Token::ParenL) => {
                self.pos += 1;
                let val = self.eval_at(0)?;
                // Reparse guarantees the closing parenthesis.
                debug_assert_eq!(self.cur(), Some(Token::ParenR));
                self.pos += 1;
                self.eval_trailing(val)
            }
            Some(Token::Literal) => {
                let text = self.cur_str();
                let unquoted = text[1..text.len() - 1].to_string();
                self.pos += 1;
                self.eval_trailing(Val::Str(unquoted))
            }
            Some(Token::Number) => {
                let num = self.cur_str().parse::<f64>().unwrap_or(f64::NAN);
                self.pos += 1;
                self.eval_trailing(Val::Num(num))
            }
            Some(Token::FuncName) => {
                let val = self.eval_function()?;
                self.eval_trailing(val)
            }
            Some(Token::OperPath) => {
                let descendants = self.cur_str() == "//";
                self.pos += 1;
                let mut set = NodeSet::singleton(self.root_item());
                if descendants {
                    self.step_descendant_or_self(&mut set)?;
                }
                if self.starts_step() {
                    self.eval_steps(&mut set)?;
                }
                Ok(Val::Set(set))
            }
            _ if self.starts_step() => {
                let mut set = NodeSet::singleton(self.ctx_item);
                self.eval_steps(&mut set)?;
                Ok(Val::Set(set))
            }
            _ => Err(self.error(ErrorKind::Syntax, "expected an expression")),
        }
    }

    /// Predicates and a path continuation after a primary expression.
    fn eval_trailing(&mut self, val: Val) -> EResult<Val> {
        let mut val = val;
        if self.cur() == Some(Token::BrackL) {
            let mut set = self.into_set(val)?;
            self.eval_predicates(&mut set)?;
            val = Val::Set(set);
        }
        if self.cur() == Some(Token::OperPath) {
            let descendants = self.cur_str() == "//";
            self.pos += 1;
            let mut set = self.into_set(val)?;
            if descendants {
                self.step_descendant_or_self(&mut set)?;
            }
            self.eval_steps(&mut set)?;
            return Ok(Val::Set(set));
        }
        Ok(val)
    }

    fn eval_steps(&mut self, set: &mut NodeSet) -> EResult<()> {
        loop {
            self.eval_one_step(set)?;
            match self.cur() {
                Some(Token::OperPath) => {
                    let descendants = self.cur_str() == "//";
                    self.pos += 1;
                    if descendants {
                        self.step_descendant_or_self(set)?;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn eval_one_step(&mut self, set: &mut NodeSet) -> EResult<()> {
        match self.cur() {
            Some(Token::Dot) => {
                self.pos += 1;
                Ok(())
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                self.step_parent(set)
            }
            Some(Token::At) => {
                self.pos += 1;
                let name = self.cur_str().to_string();
                self.pos += 1;
                self.step_attribute(set, &name)?;
                self.eval_predicates(set)
            }
            Some(Token::NameTest) => {
                let (module, name) = self.parse_name_test()?;
                let test = self.cur_str().to_string();
                self.pos += 1;
                let had_input = !set.is_empty();
                self.step_child(set, module, name)?;
                // A named child step that matches nothing in the schema
                // tree references a node that does not exist.
                if self.schema_mode()
                    && had_input
                    && set.is_empty()
                    && !matches!(name, NameFilter::Any)
                {
                    self.ctx.warn(
                        &format!(
                            "schema node \"{}\" not found in expression \"{}\"",
                            test,
                            self.expr.text()
                        ),
                        None,
                    );
                }
                self.eval_predicates(set)
            }
            Some(Token::NodeType) => {
                let node_type = self.cur_str().to_string();
                self.pos += 1;
                // Skip the empty parentheses.
                self.pos += 2;
                match node_type.as_str() {
                    "node" => self.step_child(set, ModFilter::Any, NameFilter::Any)?,
                    "text" => self.step_text(set)?,
                    _ => {
                        // No comment nodes in YANG data.
                        set.items.clear();
                        set.index = None;
                    }
                }
                self.eval_predicates(set)
            }
            _ => Err(self.error(ErrorKind::Syntax, "expected a step")),
        }
    }

    fn parse_name_test(&self) -> EResult<(ModFilter, NameFilter)> {
        let text = self.cur_str();
        if text == "*" {
            return Ok((ModFilter::Any, NameFilter::Any));
        }
        match text.split_once(':') {
            Some((prefix, local)) => {
                let module = self
                    .ctx
                    .resolve_prefix(self.local_module, prefix)
                    .ok_or_else(|| {
                        self.error(
                            ErrorKind::UnknownModule,
                            &format!("unknown module prefix \"{}\"", prefix),
                        )
                    })?;
                let name = if local == "*" {
                    NameFilter::Any
                } else {
                    match self.ctx.interner.lookup(local) {
                        Some(sym) => NameFilter::Name(sym),
                        None => NameFilter::Missing,
                    }
                };
                Ok((ModFilter::Module(module), name))
            }
            None => {
                let name = match self.ctx.interner.lookup(text) {
                    Some(sym) => NameFilter::Name(sym),
                    None => NameFilter::Missing,
                };
                Ok((ModFilter::Module(self.local_module), name))
            }
        }
    }

    // ===== axis moves =====

    fn data_children_of(&self, item: Item) -> Vec<DataNodeId> {
        let tree = self.tree();
        match item {
            Item::DRoot => tree.children_of(None).collect(),
            Item::DNode(id) => tree.children_of(Some(id)).collect(),
            _ => Vec::new(),
        }
    }

    fn schema_children_of(&self, item: Item) -> Vec<SnodeId> {
        let output = self.opts.contains(XPathOptions::SNODE_OUTPUT);
        match item {
            Item::SRoot => {
                self.ctx.data_children(None, self.local_module, output)
            }
            Item::SNode(id) => {
                self.ctx.data_children(Some(id), self.local_module, output)
            }
            _ => Vec::new(),
        }
    }

    /// Push a data node into a result set, surfacing the unresolved-when
    /// signal when requested.
    fn push_dnode(&self, set: &mut NodeSet, id: DataNodeId) -> EResult<()> {
        if self.opts.contains(XPathOptions::WHEN_ENABLED)
            && self
                .tree()
                .node(id)
                .flags
                .contains(DnodeFlags::UNRES_WHEN)
        {
            return Err(EvalErr::Unresolved);
        }
        set.push_unique(Item::DNode(id));
        Ok(())
    }

    fn snode_matches(
        &self,
        snode: SnodeId,
        module: &ModFilter,
        name: &NameFilter,
    ) -> bool {
        let sdata = &self.ctx.snodes[snode];
        if self.opts.contains(XPathOptions::CONFIG_ONLY)
            && !sdata.flags.contains(SchemaFlags::CONFIG_W)
        {
            return false;
        }
        let module_ok = match module {
            ModFilter::Any => true,
            ModFilter::Module(id) => sdata.module == *id,
        };
        let name_ok = match name {
            NameFilter::Any => true,
            NameFilter::Name(sym) => sdata.name == *sym,
            NameFilter::Missing => false,
        };
        module_ok && name_ok
    }

    fn step_child(
        &mut self,
        set: &mut NodeSet,
        module: ModFilter,
        name: NameFilter,
    ) -> EResult<()> {
        let input: Vec<Item> = std::mem::take(&mut set.items);
        set.index = None;
        if self.schema_mode() {
            for item in input {
                for child in self.schema_children_of(item) {
                    if self.snode_matches(child, &module, &name) {
                        if set.push_unique(Item::SNode(child)) {
                            self.record_dep(child);
                        }
                    }
                }
            }
        } else {
            for item in input {
                for child in self.data_children_of(item) {
                    let snode = self.tree().node(child).schema;
                    if self.snode_matches(snode, &module, &name) {
                        self.push_dnode(set, child)?;
                    }
                }
            }
            self.sort_set(set);
        }
        Ok(())
    }

    fn step_descendant_or_self(&mut self, set: &mut NodeSet) -> EResult<()> {
        let input: Vec<Item> = std::mem::take(&mut set.items);
        set.index = None;
        if self.schema_mode() {
            for item in input {
                if set.push_unique(item) {
                    if let Item::SNode(id) = item {
                        self.record_dep(id);
                    }
                }
                let mut stack = self.schema_children_of(item);
                stack.reverse();
                while let Some(id) = stack.pop() {
                    if set.push_unique(Item::SNode(id)) {
                        self.record_dep(id);
                    }
                    let mut children =
                        self.schema_children_of(Item::SNode(id));
                    children.reverse();
                    stack.extend(children);
                }
            }
        } else {
            for item in input {
                set.push_unique(item);
                // Iterative depth-first walk; the explicit stack keeps
                // `//` from revisiting subtrees already expanded through
                // their parent.
                let mut stack = self.data_children_of(item);
                stack.reverse();
                while let Some(id) = stack.pop() {
                    self.push_dnode(set, id)?;
                    let mut children =
                        self.data_children_of(Item::DNode(id));
                    children.reverse();
                    stack.extend(children);
                }
            }
            self.sort_set(set);
        }
        Ok(())
    }

    fn step_parent(&mut self, set: &mut NodeSet) -> EResult<()> {
        let input: Vec<Item> = std::mem::take(&mut set.items);
        set.index = None;
        for item in input {
            match item {
                Item::DNode(id) => {
                    match self.tree().node(id).parent {
                        Some(parent) => self.push_dnode(set, parent)?,
                        None => {
                            set.push_unique(Item::DRoot);
                        }
                    };
                }
                Item::DText(id) | Item::DMeta(id, _) => {
                    self.push_dnode(set, id)?;
                }
                Item::DRoot | Item::SRoot => (),
                Item::SNode(id) => {
                    // Climb to the nearest data ancestor.
                    let mut parent = self.ctx.snodes[id].parent;
                    while let Some(pid) = parent {
                        if self.ctx.snodes[pid].is_data_node() {
                            break;
                        }
                        parent = self.ctx.snodes[pid].parent;
                    }
                    match parent {
                        Some(pid) => {
                            if set.push_unique(Item::SNode(pid)) {
                                self.record_dep(pid);
                            }
                        }
                        None => {
                            set.push_unique(Item::SRoot);
                        }
                    }
                }
            }
        }
        if !self.schema_mode() {
            self.sort_set(set);
        }
        Ok(())
    }

    fn step_attribute(&mut self, set: &mut NodeSet, name: &str) -> EResult<()> {
        let input: Vec<Item> = std::mem::take(&mut set.items);
        set.index = None;
        if self.schema_mode() {
            // Schema nodes have no attribute analogue.
            return Ok(());
        }
        // A prefixed attribute name resolves through the same prefix
        // lookup as element name tests; metadata stores the annotation
        // module by name.
        let (want_module, want_name) = match name.split_once(':') {
            Some((prefix, local)) => {
                let module = self
                    .ctx
                    .resolve_prefix(self.local_module, prefix)
                    .ok_or_else(|| {
                        self.error(
                            ErrorKind::UnknownModule,
                            &format!("unknown module prefix \"{}\"", prefix),
                        )
                    })?;
                let module_name =
                    self.ctx.resolve(self.ctx.modules[module].name);
                (Some(module_name), local)
            }
            None => (None, name),
        };
        for item in input {
            if let Item::DNode(id) = item {
                for (index, meta) in
                    self.tree().node(id).meta.iter().enumerate()
                {
                    let name_ok = want_name == "*" || meta.name == want_name;
                    let module_ok = match want_module {
                        Some(module) => {
                            meta.module.as_deref() == Some(module)
                        }
                        None => true,
                    };
                    if name_ok && module_ok {
                        set.push_unique(Item::DMeta(id, index as u32));
                    }
                }
            }
        }
        Ok(())
    }

    fn step_text(&mut self, set: &mut NodeSet) -> EResult<()> {
        let input: Vec<Item> = std::mem::take(&mut set.items);
        set.index = None;
        if self.schema_mode() {
            return Ok(());
        }
        for item in input {
            if let Item::DNode(id) = item {
                if self.tree().node(id).value.is_some() {
                    set.push_unique(Item::DText(id));
                }
            }
        }
        Ok(())
    }

    // ===== predicates =====

    /// Find the token index just past the matching `]` for a predicate
    /// whose `[` was already consumed.
    fn predicate_end(&self) -> usize {
        let mut depth = 1usize;
        let mut pos = self.pos;
        while depth > 0 {
            match self.expr.tokens[pos] {
                Token::BrackL => depth += 1,
                Token::BrackR => depth -= 1,
                _ => (),
            }
            pos += 1;
        }
        pos
    }

    fn eval_predicates(&mut self, set: &mut NodeSet) -> EResult<()> {
        while self.cur() == Some(Token::BrackL) {
            self.pos += 1;
            let start = self.pos;
            let end = self.predicate_end();
            let items = std::mem::take(&mut set.items);
            set.index = None;
            let size = items.len();
            let saved = (self.ctx_item, self.ctx_pos, self.ctx_size);
            for (index, item) in items.into_iter().enumerate() {
                self.pos = start;
                self.ctx_item = item;
                self.ctx_pos = index + 1;
                self.ctx_size = size;
                let result = self.eval_at(0);
                (self.ctx_item, self.ctx_pos, self.ctx_size) = saved;
                let val = result?;
                let keep = if self.schema_mode() {
                    // Predicates cannot be decided statically; all
                    // candidates stay in context.
                    true
                } else {
                    match val {
                        Val::Num(n) => n == (index + 1) as f64,
                        other => self.to_bool(&other),
                    }
                };
                if keep {
                    set.push_unique(item);
                }
            }
            self.pos = end;
        }
        Ok(())
    }

    // ===== document order =====

    fn positions(&mut self) -> &HashMap<DataNodeId, u32> {
        if self.positions.is_none() {
            let tree = self.tree();
            let mut map = HashMap::new();
            let mut next = 1u32;
            let mut stack: Vec<DataNodeId> =
                tree.children_of(None).collect();
            stack.reverse();
            while let Some(id) = stack.pop() {
                map.insert(id, next);
                next += 1;
                let mut children: Vec<DataNodeId> =
                    tree.children_of(Some(id)).collect();
                children.reverse();
                stack.extend(children);
            }
            self.positions = Some(map);
        }
        self.positions.as_ref().unwrap()
    }

    fn item_key(&mut self, item: Item) -> (u32, u32) {
        match item {
            Item::DRoot | Item::SRoot => (0, 0),
            Item::DNode(id) => {
                (*self.positions().get(&id).unwrap_or(&u32::MAX), 0)
            }
            Item::DText(id) => {
                (*self.positions().get(&id).unwrap_or(&u32::MAX), 1)
            }
            Item::DMeta(id, index) => (
                *self.positions().get(&id).unwrap_or(&u32::MAX),
                2 + index,
            ),
            Item::SNode(id) => (id.index() as u32 + 1, 0),
        }
    }

    fn sort_set(&mut self, set: &mut NodeSet) {
        if set.items.len() > 1 {
            let mut keyed: Vec<((u32, u32), Item)> = set
                .items
                .iter()
                .map(|item| (self.item_key(*item), *item))
                .collect();
            keyed.sort_by_key(|(key, _)| *key);
            set.items = keyed.into_iter().map(|(_, item)| item).collect();
        }
    }

    // ===== value conversions =====

    fn string_value(&self, item: Item) -> String {
        match item {
            Item::DNode(id) | Item::DText(id) => self
                .tree()
                .node(id)
                .value
                .as_ref()
                .map(|value| value.canonical.clone())
                .unwrap_or_default(),
            Item::DMeta(id, index) => {
                self.tree().node(id).meta[index as usize].value.clone()
            }
            Item::DRoot | Item::SRoot | Item::SNode(_) => String::new(),
        }
    }

    fn to_bool(&self, val: &Val) -> bool {
        match val {
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::Set(set) => !set.is_empty(),
        }
    }

    fn to_num(&self, val: &Val) -> f64 {
        match val {
            Val::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Val::Num(n) => *n,
            Val::Str(s) => str_to_num(s),
            Val::Set(set) => match set.items.first() {
                Some(item) => str_to_num(&self.string_value(*item)),
                None => f64::NAN,
            },
        }
    }

    fn to_str(&self, val: &Val) -> String {
        match val {
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => num_to_str(*n),
            Val::Str(s) => s.clone(),
            Val::Set(set) => match set.items.first() {
                Some(item) => self.string_value(*item),
                None => String::new(),
            },
        }
    }

    fn into_set(&self, val: Val) -> EResult<NodeSet> {
        match val {
            Val::Set(set) => Ok(set),
            _ => Err(self.error(
                ErrorKind::TypeMismatch,
                "operand is not a node set",
            )),
        }
    }

    /// Canonicalise a scalar against the type of the first node-set
    /// member, falling back to the raw lexical when the value does not
    /// parse.
    fn canonical_scalar(&self, set: &NodeSet, scalar: &str) -> String {
        let leaf_type = set.items.iter().find_map(|item| match item {
            Item::DNode(id) => {
                let snode = self.tree().node(*id).schema;
                self.ctx.snodes[snode].leaf_type()
            }
            _ => None,
        });
        match leaf_type {
            Some(ty) => {
                match store_value(self.ctx, self.local_module, ty, scalar) {
                    Ok(stored) => stored.canonical,
                    Err(_) => scalar.to_string(),
                }
            }
            None => scalar.to_string(),
        }
    }

    fn compare_eq(
        &mut self,
        lhs: &Val,
        rhs: &Val,
        negate: bool,
    ) -> EResult<bool> {
        if self.schema_mode() {
            // Static analysis only collects references.
            return Ok(false);
        }
        let result = match (lhs, rhs) {
            (Val::Set(a), Val::Set(b)) => {
                let bvals: Vec<String> = b
                    .items
                    .iter()
                    .map(|item| self.string_value(*item))
                    .collect();
                a.items.iter().any(|item| {
                    let av = self.string_value(*item);
                    bvals.iter().any(|bv| (av == *bv) != negate)
                })
            }
            (Val::Set(set), Val::Bool(b)) | (Val::Bool(b), Val::Set(set)) => {
                (!set.is_empty() == *b) != negate
            }
            (Val::Set(set), Val::Num(n)) | (Val::Num(n), Val::Set(set)) => {
                set.items.iter().any(|item| {
                    let value = str_to_num(&self.string_value(*item));
                    (value == *n) != negate
                })
            }
            (Val::Set(set), Val::Str(s)) | (Val::Str(s), Val::Set(set)) => {
                let canon = self.canonical_scalar(set, s);
                set.items.iter().any(|item| {
                    (self.string_value(*item) == canon) != negate
                })
            }
            (Val::Bool(a), b) | (b, Val::Bool(a)) => {
                (*a == self.to_bool(b)) != negate
            }
            (Val::Num(a), b) | (b, Val::Num(a)) => {
                (*a == self.to_num(b)) != negate
            }
            (Val::Str(a), Val::Str(b)) => (a == b) != negate,
        };
        Ok(result)
    }

    fn rel_nums(&self, val: &Val) -> Vec<f64> {
        match val {
            Val::Set(set) => set
                .items
                .iter()
                .map(|item| str_to_num(&self.string_value(*item)))
                .collect(),
            other => vec![self.to_num(other)],
        }
    }

    fn compare_rel(&self, lhs: &Val, rhs: &Val, op: &str) -> bool {
        if self.schema_mode() {
            return false;
        }
        let avals = self.rel_nums(lhs);
        let bvals = self.rel_nums(rhs);
        avals.iter().any(|a| {
            bvals.iter().any(|b| match op {
                "<" => a < b,
                "<=" => a <= b,
                ">" => a > b,
                _ => a >= b,
            })
        })
    }

    // ===== function calls =====

    fn eval_function(&mut self) -> EResult<Val> {
        let name = self.cur_str().to_string();
        self.pos += 1;
        debug_assert_eq!(self.cur(), Some(Token::ParenL));
        self.pos += 1;
        let mut args = Vec::new();
        if self.cur() != Some(Token::ParenR) {
            loop {
                args.push(self.eval_at(0)?);
                if self.cur() == Some(Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        debug_assert_eq!(self.cur(), Some(Token::ParenR));
        self.pos += 1;
        self.dispatch_function(&name, args)
    }

    fn arg_or_ctx_string(&self, args: &[Val]) -> String {
        match args.first() {
            Some(val) => self.to_str(val),
            None => self.string_value(self.ctx_item),
        }
    }

    fn arg_or_ctx_set(&self, args: Vec<Val>) -> EResult<NodeSet> {
        match args.into_iter().next() {
            Some(val) => self.into_set(val),
            None => Ok(NodeSet::singleton(self.ctx_item)),
        }
    }

    fn dispatch_function(
        &mut self,
        name: &str,
        args: Vec<Val>,
    ) -> EResult<Val> {
        match name {
            "boolean" => Ok(Val::Bool(self.to_bool(&args[0]))),
            "ceiling" => Ok(Val::Num(self.to_num(&args[0]).ceil())),
            "concat" => {
                let mut out = String::new();
                for arg in &args {
                    out.push_str(&self.to_str(arg));
                }
                Ok(Val::Str(out))
            }
            "contains" => {
                let haystack = self.to_str(&args[0]);
                let needle = self.to_str(&args[1]);
                Ok(Val::Bool(haystack.contains(&needle)))
            }
            "count" => {
                let set = self.into_set(args.into_iter().next().unwrap())?;
                Ok(Val::Num(set.len() as f64))
            }
            "false" => Ok(Val::Bool(false)),
            "floor" => Ok(Val::Num(self.to_num(&args[0]).floor())),
            // id() has no meaning without DTD-style IDs; it is a no-op
            // returning an empty node set.
            "id" => Ok(Val::Set(NodeSet::default())),
            "lang" => Ok(Val::Bool(false)),
            "last" => Ok(Val::Num(self.ctx_size as f64)),
            // name() deliberately matches local-name(): YANG qualifies
            // names by module, not by a prefixed qname string.
            "local-name" | "name" => {
                let set = self.arg_or_ctx_set(args)?;
                let name = match set.items.first() {
                    Some(Item::DNode(id)) | Some(Item::DText(id)) => {
                        let snode = self.tree().node(*id).schema;
                        self.ctx.resolve(self.ctx.snodes[snode].name).to_string()
                    }
                    Some(Item::DMeta(id, index)) => self.tree().node(*id).meta
                        [*index as usize]
                        .name
                        .clone(),
                    Some(Item::SNode(id)) => {
                        self.ctx.resolve(self.ctx.snodes[*id].name).to_string()
                    }
                    _ => String::new(),
                };
                Ok(Val::Str(name))
            }
            "namespace-uri" => {
                let set = self.arg_or_ctx_set(args)?;
                let ns = match set.items.first() {
                    Some(Item::DNode(id)) | Some(Item::DText(id)) => {
                        let snode = self.tree().node(*id).schema;
                        let module = self.ctx.snodes[snode].module;
                        self.ctx
                            .resolve(self.ctx.modules[module].namespace)
                            .to_string()
                    }
                    Some(Item::SNode(id)) => {
                        let module = self.ctx.snodes[*id].module;
                        self.ctx
                            .resolve(self.ctx.modules[module].namespace)
                            .to_string()
                    }
                    _ => String::new(),
                };
                Ok(Val::Str(ns))
            }
            "normalize-space" => {
                let s = self.arg_or_ctx_string(&args);
                Ok(Val::Str(
                    s.split_whitespace().collect::<Vec<_>>().join(" "),
                ))
            }
            "not" => Ok(Val::Bool(!self.to_bool(&args[0]))),
            "number" => {
                let num = match args.first() {
                    Some(val) => self.to_num(val),
                    None => str_to_num(&self.string_value(self.ctx_item)),
                };
                Ok(Val::Num(num))
            }
            "position" => Ok(Val::Num(self.ctx_pos as f64)),
            "round" => Ok(Val::Num(xpath_round(self.to_num(&args[0])))),
            "starts-with" => {
                let s = self.to_str(&args[0]);
                let prefix = self.to_str(&args[1]);
                Ok(Val::Bool(s.starts_with(&prefix)))
            }
            "string" => {
                let s = match args.first() {
                    Some(val) => self.to_str(val),
                    None => self.string_value(self.ctx_item),
                };
                Ok(Val::Str(s))
            }
            "string-length" => {
                let s = self.arg_or_ctx_string(&args);
                Ok(Val::Num(s.chars().count() as f64))
            }
            "substring" => self.fn_substring(&args),
            "substring-after" => {
                let s = self.to_str(&args[0]);
                let pattern = self.to_str(&args[1]);
                let result = match s.find(&pattern) {
                    Some(at) => s[at + pattern.len()..].to_string(),
                    None => String::new(),
                };
                Ok(Val::Str(result))
            }
            "substring-before" => {
                let s = self.to_str(&args[0]);
                let pattern = self.to_str(&args[1]);
                let result = match s.find(&pattern) {
                    Some(at) => s[..at].to_string(),
                    None => String::new(),
                };
                Ok(Val::Str(result))
            }
            "sum" => {
                let set = self.into_set(args.into_iter().next().unwrap())?;
                let sum = set
                    .items
                    .iter()
                    .map(|item| str_to_num(&self.string_value(*item)))
                    .sum();
                Ok(Val::Num(sum))
            }
            "translate" => {
                let s = self.to_str(&args[0]);
                let from: Vec<char> = self.to_str(&args[1]).chars().collect();
                let to: Vec<char> = self.to_str(&args[2]).chars().collect();
                let out = s
                    .chars()
                    .filter_map(|c| match from.iter().position(|f| *f == c) {
                        Some(at) => to.get(at).copied(),
                        None => Some(c),
                    })
                    .collect();
                Ok(Val::Str(out))
            }
            "true" => Ok(Val::Bool(true)),
            "bit-is-set" => {
                let bit = self.to_str(&args[1]);
                let set = self.into_set(args.into_iter().next().unwrap())?;
                let result = set.items.first().is_some_and(|item| {
                    self.string_value(*item)
                        .split_whitespace()
                        .any(|word| word == bit)
                });
                Ok(Val::Bool(result))
            }
            "current" => Ok(Val::Set(NodeSet::singleton(self.orig))),
            "deref" => {
                let set = self.into_set(args.into_iter().next().unwrap())?;
                self.fn_deref(set)
            }
            "derived-from" | "derived-from-or-self" => {
                let or_self = name == "derived-from-or-self";
                let base_name = self.to_str(&args[1]);
                let set = self.into_set(args.into_iter().next().unwrap())?;
                self.fn_derived_from(set, &base_name, or_self)
            }
            "enum-value" => {
                let set = self.into_set(args.into_iter().next().unwrap())?;
                self.fn_enum_value(set)
            }
            "re-match" => {
                let s = self.to_str(&args[0]);
                let pattern = self.to_str(&args[1]);
                let regex = self.ctx.cached_regex(&pattern)?;
                Ok(Val::Bool(regex.is_match(&s)))
            }
            _ => Err(self.error(
                ErrorKind::UnknownFunction,
                &format!("unknown XPath function \"{}\"", name),
            )),
        }
    }

    fn fn_substring(&self, args: &[Val]) -> EResult<Val> {
        let s = self.to_str(&args[0]);
        let chars: Vec<char> = s.chars().collect();
        let start = xpath_round(self.to_num(&args[1]));
        if start.is_nan() {
            return Ok(Val::Str(String::new()));
        }
        let end = match args.get(2) {
            Some(len) => {
                let len = xpath_round(self.to_num(len));
                if len.is_nan() {
                    return Ok(Val::Str(String::new()));
                }
                start + len
            }
            None => f64::INFINITY,
        };
        let out: String = chars
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let p = (*i + 1) as f64;
                p >= start && p < end
            })
            .map(|(_, c)| *c)
            .collect();
        Ok(Val::Str(out))
    }

    fn fn_deref(&mut self, set: NodeSet) -> EResult<Val> {
        let mut out = NodeSet::default();
        if self.schema_mode() {
            if let Some(Item::SNode(id)) = set.items.first() {
                if let Some(ty) = self.ctx.snodes[*id].leaf_type() {
                    if let TypeSpec::Leafref {
                        target: Some(target),
                        ..
                    } = &self.ctx.types[ty].spec
                    {
                        out.push_unique(Item::SNode(*target));
                        self.record_dep(*target);
                    }
                }
            }
            return Ok(Val::Set(out));
        }
        if let Some(Item::DNode(id)) = set.items.first() {
            let node = self.tree().node(*id);
            if let Some(target) = node.target {
                out.push_unique(Item::DNode(target));
                return Ok(Val::Set(out));
            }
            let snode = &self.ctx.snodes[node.schema];
            if let Some(ty) = snode.leaf_type() {
                match &self.ctx.types[ty].spec {
                    TypeSpec::Leafref {
                        path, path_module, ..
                    } => {
                        let value = node
                            .value
                            .as_ref()
                            .map(|v| v.canonical.clone())
                            .unwrap_or_default();
                        let candidates = eval_node_ids(
                            self.tree(),
                            path,
                            Some(*id),
                            *path_module,
                            self.opts & XPathOptions::CONFIG_ONLY,
                        )
                        .map_err(EvalErr::Other)?;
                        if let Some(target) =
                            candidates.into_iter().find(|candidate| {
                                self.tree()
                                    .node(*candidate)
                                    .value
                                    .as_ref()
                                    .is_some_and(|v| v.canonical == value)
                            })
                        {
                            out.push_unique(Item::DNode(target));
                        }
                    }
                    TypeSpec::InstanceIdentifier { .. } => {
                        if let Some(value) = &node.value {
                            if let Some(target) = resolve_instance_id(
                                self.tree(),
                                &value.canonical,
                            )
                            .map_err(EvalErr::Other)?
                            {
                                out.push_unique(Item::DNode(target));
                            }
                        }
                    }
                    _ => (),
                }
            }
        }
        Ok(Val::Set(out))
    }

    fn fn_derived_from(
        &self,
        set: NodeSet,
        base_name: &str,
        or_self: bool,
    ) -> EResult<Val> {
        if self.schema_mode() {
            return Ok(Val::Bool(false));
        }
        let base =
            match self.ctx.find_identity(self.local_module, base_name) {
                Some(base) => base,
                None => return Ok(Val::Bool(false)),
            };
        let result = set.items.iter().any(|item| {
            let value = self.string_value(*item);
            if value.is_empty() {
                return false;
            }
            match self.ctx.find_identity(self.local_module, &value) {
                Some(identity) => {
                    (or_self && identity == base)
                        || self.ctx.identities[base]
                            .derived
                            .contains(&identity)
                }
                None => false,
            }
        });
        Ok(Val::Bool(result))
    }

    fn fn_enum_value(&self, set: NodeSet) -> EResult<Val> {
        if self.schema_mode() {
            return Ok(Val::Num(f64::NAN));
        }
        let value = match set.items.first() {
            Some(Item::DNode(id)) => {
                let node = self.tree().node(*id);
                let snode = &self.ctx.snodes[node.schema];
                match snode.leaf_type() {
                    Some(ty) => match &self.ctx.types[ty].spec {
                        TypeSpec::Enumeration { enums } => {
                            let canonical = node
                                .value
                                .as_ref()
                                .map(|v| v.canonical.as_str())
                                .unwrap_or("");
                            enums
                                .iter()
                                .find(|(name, _)| {
                                    self.ctx.resolve(*name) == canonical
                                })
                                .map(|(_, value)| *value as f64)
                                .unwrap_or(f64::NAN)
                        }
                        _ => f64::NAN,
                    },
                    None => f64::NAN,
                }
            }
            _ => f64::NAN,
        };
        Ok(Val::Num(value))
    }
}

#[derive(Clone, Copy, Debug)]
enum ModFilter {
    Any,
    Module(ModuleId),
}

#[derive(Clone, Copy, Debug)]
enum NameFilter {
    Any,
    Name(Sym),
    /// The tested name is not interned anywhere, so nothing can match.
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_conversions() {
        assert_eq!(str_to_num("42"), 42.0);
        assert_eq!(str_to_num(" -1.5 "), -1.5);
        assert!(str_to_num("1e5").is_nan());
        assert!(str_to_num("abc").is_nan());
        assert!(str_to_num("").is_nan());
        assert_eq!(num_to_str(7.0), "7");
        assert_eq!(num_to_str(-0.0), "0");
        assert_eq!(num_to_str(2.5), "2.5");
        assert_eq!(num_to_str(f64::NAN), "NaN");
        assert_eq!(num_to_str(f64::INFINITY), "Infinity");
        assert_eq!(num_to_str(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn round_negative_zero() {
        assert_eq!(xpath_round(2.5), 3.0);
        assert_eq!(xpath_round(-2.5), -2.0);
        assert_eq!(xpath_round(0.4), 0.0);
        // Values in [-0.5, 0) round to negative zero.
        let r = xpath_round(-0.4);
        assert_eq!(r, 0.0);
        assert!(r.is_sign_negative());
        let r = xpath_round(-0.5);
        assert_eq!(r, 0.0);
        assert!(r.is_sign_negative());
        assert!(xpath_round(f64::NAN).is_nan());
        assert_eq!(xpath_round(f64::INFINITY), f64::INFINITY);
    }
}
