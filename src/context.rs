//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! YANG context.
//!
//! A context owns the string interner, the arenas holding every compiled
//! schema entity, the diagnostic channel and the plugin registries. The
//! application is supposed to work with a single context in which all
//! schemas are held, and against which data trees are built and
//! validated. The schema becomes immutable once loading completes;
//! loading requires `&mut Context`, so shared references guarantee a
//! stable schema.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::arena::{Arena, Interner, Sym};
use crate::builder::ModuleDecl;
use crate::data::DataNodeRef;
use crate::error::{Error, ErrorKind, Result};
use crate::iter::{SchemaModules, Set};
use crate::logging::{DiagChannel, ErrorStorePolicy, LogCallback};
use crate::resolver;
use crate::schema::{
    IdentityDef, IdentityId, ModuleData, ModuleId, SchemaExtInstance,
    SchemaModule, SchemaNode, Snode, SnodeId, SnodePayload,
};
use crate::types::TypeDef;
use crate::xpath::{eval, XPathExpr, XPathOptions};

bitflags! {
    /// Options to change context behavior.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ContextFlags: u16 {
        /// All the imported modules of a loaded module are implemented.
        const ALL_IMPLEMENTED = 0x01;
        /// Enable all features of all loaded modules.
        const ALL_FEATURES = 0x02;
        /// Demote status downgrade references (a `current` definition
        /// referencing a `deprecated`/`obsolete` one) from errors to
        /// warnings.
        const STATUS_WARN_ONLY = 0x04;
    }
}

/// Cooperative cancellation token checked at resolver pass boundaries and
/// at each precedence descent during XPath evaluation.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

/// Key addressing a plugin registry entry: module name, definition name
/// and optional revision.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PluginKey {
    pub module: String,
    pub name: String,
    pub revision: Option<String>,
}

/// Validation callback invoked for data nodes whose schema node carries a
/// matching extension instance.
pub type ExtValidateCb =
    fn(&Context, &DataNodeRef<'_>, &SchemaExtInstance<'_>) -> Result<()>;

/// Extension plugin entry.
#[derive(Clone, Copy, Debug)]
pub struct ExtPlugin {
    pub validate: ExtValidateCb,
}

/// User-defined type plugin: canonicalise a lexical value or reject it
/// with a message.
#[derive(Clone, Copy, Debug)]
pub struct UserTypePlugin {
    pub store: fn(&str) -> std::result::Result<String, String>,
}

/// Context of the YANG schemas.
#[derive(Debug)]
pub struct Context {
    pub(crate) flags: ContextFlags,
    pub(crate) interner: Interner,
    pub(crate) modules: Arena<ModuleData>,
    pub(crate) snodes: Arena<Snode>,
    pub(crate) types: Arena<TypeDef>,
    pub(crate) identities: Arena<IdentityDef>,
    pub(crate) diag: Mutex<DiagChannel>,
    pub(crate) regex_cache: Mutex<HashMap<String, regex::Regex>>,
    pub(crate) ext_plugins: HashMap<PluginKey, ExtPlugin>,
    pub(crate) type_plugins: HashMap<PluginKey, UserTypePlugin>,
    pub(crate) cancel: Option<CancelFlag>,
    module_set_id: u16,
}

// ===== impl CancelFlag =====

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    /// Request cancellation of the operation holding this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ===== impl Context =====

impl Context {
    /// Create a new, empty context.
    pub fn new(flags: ContextFlags) -> Context {
        Context {
            flags,
            interner: Interner::new(),
            modules: Arena::new(),
            snodes: Arena::new(),
            types: Arena::new(),
            identities: Arena::new(),
            diag: Mutex::new(DiagChannel::new()),
            regex_cache: Mutex::new(HashMap::new()),
            ext_plugins: HashMap::new(),
            type_plugins: HashMap::new(),
            cancel: None,
            module_set_id: 0,
        }
    }

    /// Get the currently set context's options.
    pub fn get_options(&self) -> ContextFlags {
        self.flags
    }

    /// Configure how errors are stored on the diagnostic channel.
    pub fn set_error_policy(&mut self, policy: ErrorStorePolicy) {
        self.diag.lock().unwrap().set_policy(policy);
    }

    /// Install a diagnostics callback receiving errors and warnings.
    pub fn set_log_callback<C: LogCallback>(&mut self, callback: C) {
        self.diag.lock().unwrap().set_callback(Box::new(callback));
    }

    /// Install a cooperative cancellation token. Long-running operations
    /// (schema resolution, XPath evaluation, validation) poll it and bail
    /// out with [`ErrorKind::Cancelled`].
    pub fn set_cancel_flag(&mut self, cancel: Option<CancelFlag>) {
        self.cancel = cancel;
    }

    /// Register an extension plugin for `(module, name, revision)`.
    pub fn register_ext_plugin(&mut self, key: PluginKey, plugin: ExtPlugin) {
        self.ext_plugins.insert(key, plugin);
    }

    /// Register a user-defined type plugin for `(module, name, revision)`.
    pub fn register_user_type(
        &mut self,
        key: PluginKey,
        plugin: UserTypePlugin,
    ) {
        self.type_plugins.insert(key, plugin);
    }

    /// The last error recorded on the diagnostic channel.
    pub fn last_error(&self) -> Option<Error> {
        self.diag.lock().unwrap().last_error()
    }

    /// All errors recorded on the diagnostic channel since the last
    /// reset, subject to the store policy.
    pub fn errors(&self) -> Vec<Error> {
        self.diag.lock().unwrap().errors().to_vec()
    }

    /// Clear the stored error list.
    pub fn reset_errors(&self) {
        self.diag.lock().unwrap().reset();
    }

    /// Get current ID of the modules set, incremented on every load.
    pub fn get_module_set_id(&self) -> u16 {
        self.module_set_id
    }

    /// Load a single pre-parsed module skeleton, resolving it against the
    /// modules already present in the context.
    ///
    /// The `features` parameter specifies the module features that should
    /// be enabled. If left empty, no features are enabled. The feature
    /// string '*' enables all module features.
    pub fn load_module(
        &mut self,
        decl: ModuleDecl,
        features: &[&str],
    ) -> Result<SchemaModule<'_>> {
        let name = decl.name.clone();
        let fspec = [(name.as_str(), features)];
        self.load_modules(vec![decl], &fspec)?;
        let module = self.get_module_latest(&name).unwrap();
        Ok(module)
    }

    /// Load a batch of pre-parsed module skeletons at once, allowing
    /// mutual imports inside the batch. Features are keyed by module
    /// name.
    ///
    /// On failure the context is left unchanged: partially compiled
    /// schema entities are discarded.
    pub fn load_modules(
        &mut self,
        decls: Vec<ModuleDecl>,
        features: &[(&str, &[&str])],
    ) -> Result<()> {
        match resolver::load_modules(self, decls, features) {
            Ok(()) => {
                self.module_set_id = self.module_set_id.wrapping_add(1);
                Ok(())
            }
            Err(err) => {
                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Get YANG module of the given name and revision.
    pub fn get_module(
        &self,
        name: &str,
        revision: Option<&str>,
    ) -> Option<SchemaModule<'_>> {
        self.modules.iter().find_map(|(id, module)| {
            if self.resolve(module.name) != name {
                return None;
            }
            let matches = match revision {
                Some(revision) => module
                    .revisions
                    .first()
                    .is_some_and(|rev| self.resolve(*rev) == revision),
                None => module.revisions.is_empty(),
            };
            matches.then_some(SchemaModule { context: self, id })
        })
    }

    /// Get the latest revision of the YANG module specified by its name.
    pub fn get_module_latest(&self, name: &str) -> Option<SchemaModule<'_>> {
        self.find_module_by_name(name)
            .map(|id| SchemaModule { context: self, id })
    }

    /// Get the (only) implemented YANG module specified by its name.
    pub fn get_module_implemented(
        &self,
        name: &str,
    ) -> Option<SchemaModule<'_>> {
        self.get_module_latest(name)
            .filter(|module| module.is_implemented())
    }

    /// YANG module of the given namespace.
    pub fn get_module_ns(&self, ns: &str) -> Option<SchemaModule<'_>> {
        self.modules.iter().find_map(|(id, module)| {
            (self.resolve(module.namespace) == ns)
                .then_some(SchemaModule { context: self, id })
        })
    }

    /// Get list of loaded modules.
    pub fn modules_iter(&self) -> SchemaModules<'_> {
        SchemaModules::new(self)
    }

    /// Returns an iterator over all data nodes from all modules in the
    /// YANG context (depth-first search algorithm).
    pub fn traverse(&self) -> impl Iterator<Item = SchemaNode<'_>> {
        self.modules_iter().flat_map(|module| {
            module.traverse().collect::<Vec<_>>().into_iter()
        })
    }

    /// Compile an XPath expression for later evaluation.
    pub fn compile_xpath(&self, xpath: &str) -> Result<XPathExpr> {
        XPathExpr::compile(xpath).inspect_err(|err| self.record_error(err))
    }

    /// Evaluate an xpath expression on schema nodes, starting from the
    /// root of the schema tree.
    pub fn find_xpath<'a>(&'a self, path: &str) -> Result<Set<'a, SchemaNode<'a>>> {
        let expr = self.compile_xpath(path)?;
        let local_module = self
            .modules_iter()
            .next()
            .ok_or_else(|| Error::new(ErrorKind::Other, "empty context"))?;
        let snodes = eval::find_schema_nodes(
            self,
            &expr,
            None,
            local_module.id,
            XPathOptions::SNODE,
        )
        .inspect_err(|err| self.record_error(err))?;
        Ok(Set::new(
            snodes
                .into_iter()
                .map(move |id| SchemaNode::new(self, id))
                .collect(),
        ))
    }

    /// Get a single schema node based on the given data path.
    pub fn find_path(&self, path: &str) -> Result<SchemaNode<'_>> {
        let mut set = self.find_xpath(path)?;
        let first = set.next().ok_or_else(|| {
            let err = Error::new_path(
                ErrorKind::UnresolvedReference,
                "no node found for path",
                path,
            );
            self.record_error(&err);
            err
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

    // ===== crate-internal helpers =====

    pub(crate) fn resolve(&self, sym: Sym) -> &str {
        self.interner.resolve(sym)
    }

    pub(crate) fn record_error(&self, error: &Error) {
        self.diag.lock().unwrap().record(error);
    }

    pub(crate) fn warn(&self, msg: &str, schema_path: Option<&str>) {
        self.diag.lock().unwrap().warn(msg, schema_path);
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => Err(Error::new(
                ErrorKind::Cancelled,
                "operation cancelled by caller",
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn module_by_index(
        &self,
        index: usize,
    ) -> Option<SchemaModule<'_>> {
        (index < self.modules.len()).then(|| SchemaModule {
            context: self,
            id: crate::arena::Id::new(index),
        })
    }

    pub(crate) fn find_module_by_name(&self, name: &str) -> Option<ModuleId> {
        let sym = self.interner.lookup(name)?;
        self.modules
            .iter()
            .find_map(|(id, module)| (module.name == sym).then_some(id))
    }

    /// Resolve an XPath/identityref prefix against a local module: the
    /// module's own name and prefix, its import prefixes, and finally any
    /// loaded module name (the instance-data convention).
    pub(crate) fn resolve_prefix(
        &self,
        local_module: ModuleId,
        prefix: &str,
    ) -> Option<ModuleId> {
        let module = &self.modules[local_module];
        if self.resolve(module.name) == prefix
            || self.resolve(module.prefix) == prefix
        {
            return Some(local_module);
        }
        if let Some(import) = module
            .imports
            .iter()
            .find(|import| self.resolve(import.prefix) == prefix)
        {
            return Some(import.module);
        }
        self.find_module_by_name(prefix)
    }

    /// Look up an identity by `[prefix:]name` relative to a module.
    pub(crate) fn find_identity(
        &self,
        local_module: ModuleId,
        name: &str,
    ) -> Option<IdentityId> {
        let (module, local) = match name.split_once(':') {
            Some((prefix, local)) => {
                (self.resolve_prefix(local_module, prefix)?, local)
            }
            None => (local_module, name),
        };
        let sym = self.interner.lookup(local)?;
        self.modules[module]
            .identities
            .iter()
            .copied()
            .find(|id| self.identities[*id].name == sym)
    }

    /// Whether `identity` is `base` or transitively derived from it.
    pub(crate) fn identity_derived_or_self(
        &self,
        base: IdentityId,
        identity: IdentityId,
    ) -> bool {
        base == identity || self.identities[base].derived.contains(&identity)
    }

    pub(crate) fn user_type_plugin(
        &self,
        module: Sym,
        name: Sym,
        revision: Option<Sym>,
    ) -> Option<&UserTypePlugin> {
        let key = PluginKey {
            module: self.resolve(module).to_string(),
            name: self.resolve(name).to_string(),
            revision: revision.map(|rev| self.resolve(rev).to_string()),
        };
        self.type_plugins
            .get(&key)
            .or_else(|| {
                // Fall back to a revision-independent registration.
                self.type_plugins.get(&PluginKey {
                    revision: None,
                    ..key
                })
            })
    }

    pub(crate) fn ext_plugin(
        &self,
        ext: &crate::schema::ExtInstance,
    ) -> Option<&ExtPlugin> {
        let key = PluginKey {
            module: self.resolve(ext.def_module).to_string(),
            name: self.resolve(ext.name).to_string(),
            revision: ext.revision.map(|rev| self.resolve(rev).to_string()),
        };
        self.ext_plugins.get(&key).or_else(|| {
            self.ext_plugins.get(&PluginKey {
                revision: None,
                ..key
            })
        })
    }

    /// Iterate over sibling schema node ids starting at `first`.
    pub(crate) fn schild_iter(
        &self,
        first: Option<SnodeId>,
    ) -> impl Iterator<Item = SnodeId> + '_ {
        std::iter::successors(first, move |id| self.snodes[*id].next)
    }

    /// Collect the *data* children of a schema node (or of a module's
    /// top-level when `parent` is `None`), descending transparently into
    /// choice/case nodes and the input or output envelope of operations,
    /// none of which have instances of their own in data trees.
    pub(crate) fn data_children(
        &self,
        parent: Option<SnodeId>,
        module: ModuleId,
        output: bool,
    ) -> Vec<SnodeId> {
        let mut out = Vec::new();
        match parent {
            Some(parent) => self.data_children_rec(
                self.snodes[parent].first_child,
                output,
                &mut out,
            ),
            None => {
                // Top-level data nodes of every module; the local module
                // first so unprefixed matches resolve predictably.
                self.data_children_rec(
                    self.modules[module].data,
                    output,
                    &mut out,
                );
                for (id, mdata) in self.modules.iter() {
                    if id != module {
                        self.data_children_rec(mdata.data, output, &mut out);
                    }
                }
            }
        }
        out
    }

    fn data_children_rec(
        &self,
        first: Option<SnodeId>,
        output: bool,
        out: &mut Vec<SnodeId>,
    ) {
        for id in self.schild_iter(first) {
            let snode = &self.snodes[id];
            match &snode.payload {
                SnodePayload::Input if output => (),
                SnodePayload::Output if !output => (),
                SnodePayload::Input | SnodePayload::Output => {
                    self.data_children_rec(snode.first_child, output, out)
                }
                _ if snode.is_data_node() => out.push(id),
                _ => {
                    self.data_children_rec(snode.first_child, output, out)
                }
            }
        }
    }

    /// Compile a regular expression used by `re-match`, caching the
    /// compiled form per literal.
    pub(crate) fn cached_regex(
        &self,
        pattern: &str,
    ) -> Result<regex::Regex> {
        let mut cache = self.regex_cache.lock().unwrap();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
        let translated = crate::types::xsd_regex_to_rust(pattern);
        let regex = regex::Regex::new(&translated).map_err(|err| {
            Error::new(
                ErrorKind::Syntax,
                format!("invalid regular expression: {}", err),
            )
        })?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Context) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new(ContextFlags::empty())
    }
}

// Top-level containers for RPC input/output are addressed through their
// parent operation node; expose a helper for the validator and evaluator.
pub(crate) fn operation_child(
    ctx: &Context,
    rpc: SnodeId,
    output: bool,
) -> Option<SnodeId> {
    ctx.schild_iter(ctx.snodes[rpc].first_child).find(|id| {
        matches!(
            (&ctx.snodes[*id].payload, output),
            (SnodePayload::Output, true) | (SnodePayload::Input, false)
        )
    })
}
