//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Schema resolver.
//!
//! Turns a batch of pre-parsed module skeletons into compiled, immutable
//! schema. The passes run in a fixed order: import/include graph and
//! revision ordering, identifier uniqueness, typedef closure, identity
//! DAG, grouping expansion, augment application, deviation application,
//! leafref binding, when/must static analysis, and status gating. The
//! first hard error aborts the load and rolls the context back to its
//! previous state.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::arena::Sym;
use crate::builder::{
    AugmentDecl, DataDecl, DataDeclKind, DeviateDecl, DeviateFields,
    DeviationDecl, ModuleDecl, MustDecl, TypeDecl, WhenDecl,
};
use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::schema::{
    ExtInstance, Feature, IdentityDef, IdentityId, Import, LeafListPayload,
    LeafPayload, ListPayload, ModuleData, ModuleId, MustSpec, SchemaFlags,
    SchemaNodeKind, Snode, SnodeId, SnodePayload, Status, WhenSpec,
};
use crate::types::{
    parse_decimal64, parse_int_lexical, store_value, xsd_regex_to_rust,
    PatternSpec, Ranges, StoredValue, TypeDef, TypeId, TypeSpec,
};
use crate::xpath::{eval, XPathExpr, XPathOptions};

/// Arena watermarks taken before the load; everything past them is
/// discarded on failure.
struct Snapshot {
    modules: usize,
    snodes: usize,
    types: usize,
    identities: usize,
}

/// Undo log for mutations of pre-existing schema entities (augment
/// grafts and deviations touch modules loaded earlier).
#[derive(Default)]
struct UndoLog {
    snodes: Vec<(SnodeId, Snode)>,
    modules: Vec<(ModuleId, ModuleData)>,
}

impl Snapshot {
    fn take(ctx: &Context) -> Snapshot {
        Snapshot {
            modules: ctx.modules.len(),
            snodes: ctx.snodes.len(),
            types: ctx.types.len(),
            identities: ctx.identities.len(),
        }
    }
}

impl UndoLog {
    /// Remember the previous state of a node created before the snapshot.
    fn touch_snode(&mut self, ctx: &Context, snap: &Snapshot, id: SnodeId) {
        if id.index() < snap.snodes
            && !self.snodes.iter().any(|(seen, _)| *seen == id)
        {
            self.snodes.push((id, ctx.snodes[id].clone()));
        }
    }

    fn touch_module(
        &mut self,
        ctx: &Context,
        snap: &Snapshot,
        id: ModuleId,
    ) {
        if id.index() < snap.modules
            && !self.modules.iter().any(|(seen, _)| *seen == id)
        {
            self.modules.push((id, ctx.modules[id].clone()));
        }
    }

    fn rollback(self, ctx: &mut Context, snap: &Snapshot) {
        for (id, old) in self.snodes {
            ctx.snodes[id] = old;
        }
        for (id, old) in self.modules {
            ctx.modules[id] = old;
        }
        ctx.modules.truncate(snap.modules);
        ctx.snodes.truncate(snap.snodes);
        ctx.types.truncate(snap.types);
        ctx.identities.truncate(snap.identities);
    }
}

/// Feature expressions: `a and not (b or c)`.
#[derive(Clone, Debug)]
enum FeatureExpr {
    Ref(String),
    Not(Box<FeatureExpr>),
    And(Box<FeatureExpr>, Box<FeatureExpr>),
    Or(Box<FeatureExpr>, Box<FeatureExpr>),
}

/// Name resolution environment of a compilation step. Nodes expanded from
/// a grouping belong to the using module but resolve names in the module
/// that defined the grouping.
#[derive(Clone, Copy)]
struct Env {
    /// Module the compiled nodes belong to.
    ns: ModuleId,
    /// Module against which typedefs, groupings, features and prefixes
    /// resolve.
    def: ModuleId,
    config: bool,
    status: Status,
    flags: SchemaFlags,
}

struct Resolver<'a> {
    ctx: &'a mut Context,
    snap: Snapshot,
    undo: UndoLog,
    new_modules: Vec<ModuleId>,
    /// Augments declared by the batch, applied after all trees compile.
    augments: Vec<(ModuleId, AugmentDecl)>,
    deviations: Vec<(ModuleId, DeviationDecl)>,
}

pub(crate) fn load_modules(
    ctx: &mut Context,
    decls: Vec<ModuleDecl>,
    features: &[(&str, &[&str])],
) -> Result<()> {
    let snap = Snapshot::take(ctx);
    let mut resolver = Resolver {
        ctx,
        snap,
        undo: UndoLog::default(),
        new_modules: Vec::new(),
        augments: Vec::new(),
        deviations: Vec::new(),
    };
    match resolver.run(decls, features) {
        Ok(()) => Ok(()),
        Err(err) => {
            let Resolver {
                ctx, snap, undo, ..
            } = resolver;
            undo.rollback(ctx, &snap);
            Err(err)
        }
    }
}

impl Resolver<'_> {
    fn run(
        &mut self,
        decls: Vec<ModuleDecl>,
        features: &[(&str, &[&str])],
    ) -> Result<()> {
        // Pass 1: module graph, cycles, revision order.
        let order = module_graph_order(self.ctx, &decls)?;
        self.ctx.check_cancelled()?;

        // Pass 2 (part): create module shells, checking identifier
        // uniqueness inside each module scope.
        let mut created: Vec<(ModuleId, ModuleDecl)> = Vec::new();
        for index in order {
            let decl = &decls[index];
            let id = self.create_module(decl, features)?;
            self.new_modules.push(id);
            created.push((id, decl.clone()));
        }
        self.ctx.check_cancelled()?;

        // Pass 3: typedef closure.
        for (id, decl) in &created {
            for typedef in &decl.typedefs {
                let env = self.module_env(*id);
                let ty = self.compile_type(
                    env,
                    &typedef.type_,
                    Some(typedef.name.as_str()),
                    typedef.default.as_deref(),
                    typedef.units.as_deref(),
                )?;
                let name = self.ctx.interner.intern(&typedef.name);
                self.ctx.modules[*id].typedefs.push((name, ty));
            }
        }
        self.ctx.check_cancelled()?;

        // Pass 4: identity DAG.
        self.compile_identities(&created)?;
        self.ctx.check_cancelled()?;

        // Passes 5-6 (part): compile data trees, expanding groupings
        // in place.
        for (id, decl) in &created {
            self.compile_module_tree(*id, decl)?;
            for augment in &decl.augments {
                self.augments.push((*id, augment.clone()));
            }
            for deviation in &decl.deviations {
                self.deviations.push((*id, deviation.clone()));
            }
        }
        self.ctx.check_cancelled()?;

        // Pass 6: augments, ordered by target depth so that an augment
        // extending another augment's subtree finds its target.
        let mut augments = std::mem::take(&mut self.augments);
        augments.sort_by_key(|(_, augment)| {
            augment.target.matches('/').count()
        });
        for (module, augment) in augments {
            self.apply_augment(module, &augment)?;
        }
        self.ctx.check_cancelled()?;

        // Pass 7: deviations, which may remove augmented nodes.
        let deviations = std::mem::take(&mut self.deviations);
        for (module, deviation) in deviations {
            self.apply_deviation(module, &deviation)?;
        }
        self.ctx.check_cancelled()?;

        // Pass 8: leafref binding.
        self.bind_leafrefs()?;
        self.ctx.check_cancelled()?;

        // Passes 9-10: when/must static analysis and status gating.
        self.analyze_xpath()?;
        Ok(())
    }

    fn module_env(&self, id: ModuleId) -> Env {
        Env {
            ns: id,
            def: id,
            config: true,
            status: Status::Current,
            flags: SchemaFlags::CONFIG_W,
        }
    }

    fn intern(&mut self, s: &str) -> Sym {
        self.ctx.interner.intern(s)
    }

    fn intern_opt(&mut self, s: &Option<String>) -> Option<Sym> {
        s.as_ref().map(|s| self.ctx.interner.intern(s))
    }

    // ===== pass 2: module shells =====

    fn create_module(
        &mut self,
        decl: &ModuleDecl,
        features: &[(&str, &[&str])],
    ) -> Result<ModuleId> {
        if self.ctx.find_module_by_name(&decl.name).is_some() {
            return Err(Error::new(
                ErrorKind::DuplicateIdentifier,
                format!("module \"{}\" is already loaded", decl.name),
            ));
        }

        // Identifier uniqueness inside the module scope.
        let mut seen = HashSet::new();
        for (kind, name) in decl
            .typedefs
            .iter()
            .map(|t| ("typedef", t.name.as_str()))
            .chain(decl.groupings.iter().map(|g| ("grouping", g.name.as_str())))
            .chain(decl.features.iter().map(|f| ("feature", f.name.as_str())))
            .chain(
                decl.identities
                    .iter()
                    .map(|i| ("identity", i.name.as_str())),
            )
        {
            if !seen.insert((kind, name)) {
                return Err(Error::new(
                    ErrorKind::DuplicateIdentifier,
                    format!(
                        "duplicate {} \"{}\" in module \"{}\"",
                        kind, name, decl.name
                    ),
                ));
            }
        }
        let mut top = HashSet::new();
        for node in &decl.data {
            if node.kind != DataDeclKind::Uses
                && !top.insert(node.name.as_str())
            {
                return Err(Error::new(
                    ErrorKind::DuplicateIdentifier,
                    format!(
                        "duplicate data definition \"{}\" in module \"{}\"",
                        node.name, decl.name
                    ),
                ));
            }
        }

        // Sort revisions newest first (ISO dates order lexically).
        let mut revisions = decl.revisions.clone();
        revisions.sort();
        revisions.reverse();
        revisions.dedup();

        // Resolve imports against already-created modules.
        let mut imports = Vec::new();
        for import in &decl.imports {
            let target = self
                .ctx
                .find_module_by_name(&import.module)
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::UnresolvedReference,
                        format!(
                            "module \"{}\" imports unknown module \"{}\"",
                            decl.name, import.module
                        ),
                    )
                })?;
            if let Some(revision) = &import.revision {
                let effective = self.ctx.modules[target]
                    .revisions
                    .first()
                    .map(|rev| self.ctx.resolve(*rev).to_string());
                if effective.as_deref() != Some(revision.as_str()) {
                    return Err(Error::new(
                        ErrorKind::UnresolvedReference,
                        format!(
                            "revision \"{}\" of module \"{}\" is not available",
                            revision, import.module
                        ),
                    ));
                }
            }
            let prefix = self.intern(&import.prefix);
            imports.push(Import {
                prefix,
                module: target,
            });
        }

        let name = self.intern(&decl.name);
        let namespace = self.intern(&decl.namespace);
        let prefix = self.intern(&decl.prefix);
        let revisions =
            revisions.iter().map(|rev| self.intern(rev)).collect();
        let organization = self.intern_opt(&decl.organization);
        let contact = self.intern_opt(&decl.contact);
        let description = self.intern_opt(&decl.description);
        let reference = self.intern_opt(&decl.reference);

        let id = self.ctx.modules.alloc(ModuleData {
            name,
            namespace,
            prefix,
            revisions,
            imports,
            implemented: true,
            organization,
            contact,
            description,
            reference,
            features: Vec::new(),
            identities: Vec::new(),
            typedefs: Vec::new(),
            groupings: decl.groupings.clone(),
            data: None,
            rpcs: None,
            notifications: None,
        });

        self.resolve_features(id, decl, features)?;
        Ok(id)
    }

    /// Decide the enabled state of each declared feature: requested by
    /// the caller (or `*`, or the ALL_FEATURES context flag) and with a
    /// satisfied if-feature expression.
    fn resolve_features(
        &mut self,
        id: ModuleId,
        decl: &ModuleDecl,
        features: &[(&str, &[&str])],
    ) -> Result<()> {
        let requested: &[&str] = features
            .iter()
            .find(|(module, _)| *module == decl.name)
            .map(|(_, list)| *list)
            .unwrap_or(&[]);
        let all = requested.contains(&"*")
            || self
                .ctx
                .flags
                .contains(crate::context::ContextFlags::ALL_FEATURES);

        // First pass: requested state only.
        let mut states: HashMap<&str, bool> = HashMap::new();
        for feature in &decl.features {
            states.insert(
                feature.name.as_str(),
                all || requested.contains(&feature.name.as_str()),
            );
        }
        // Second pass: apply if-feature gates (a feature disabled by its
        // gate stays disabled even when requested). Features can depend
        // on features declared later; iterate to fixpoint.
        let mut changed = true;
        while changed {
            changed = false;
            for feature in &decl.features {
                if !states[feature.name.as_str()] {
                    continue;
                }
                for gate in &feature.if_features {
                    let expr = parse_feature_expr(gate)?;
                    let value =
                        self.eval_feature_expr(id, &expr, &states)?;
                    if !value {
                        states.insert(feature.name.as_str(), false);
                        changed = true;
                    }
                }
            }
        }

        for feature in &decl.features {
            let name = self.intern(&feature.name);
            let enabled = states[feature.name.as_str()];
            self.ctx.modules[id].features.push(Feature {
                name,
                status: feature.status,
                enabled,
            });
        }
        Ok(())
    }

    fn eval_feature_expr(
        &self,
        module: ModuleId,
        expr: &FeatureExpr,
        local: &HashMap<&str, bool>,
    ) -> Result<bool> {
        match expr {
            FeatureExpr::Ref(name) => match name.split_once(':') {
                Some((prefix, feature)) => {
                    let target = self
                        .ctx
                        .resolve_prefix(module, prefix)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::UnknownModule,
                                format!("unknown prefix \"{}\"", prefix),
                            )
                        })?;
                    Ok(self.feature_enabled(target, feature)?)
                }
                None => match local.get(name.as_str()) {
                    Some(state) => Ok(*state),
                    None => self.feature_enabled(module, name),
                },
            },
            FeatureExpr::Not(inner) => {
                Ok(!self.eval_feature_expr(module, inner, local)?)
            }
            FeatureExpr::And(a, b) => {
                Ok(self.eval_feature_expr(module, a, local)?
                    && self.eval_feature_expr(module, b, local)?)
            }
            FeatureExpr::Or(a, b) => {
                Ok(self.eval_feature_expr(module, a, local)?
                    || self.eval_feature_expr(module, b, local)?)
            }
        }
    }

    fn feature_enabled(&self, module: ModuleId, name: &str) -> Result<bool> {
        self.ctx.modules[module]
            .features
            .iter()
            .find(|f| self.ctx.resolve(f.name) == name)
            .map(|f| f.enabled)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("unknown feature \"{}\"", name),
                )
            })
    }

    fn if_features_satisfied(
        &self,
        module: ModuleId,
        gates: &[String],
    ) -> Result<bool> {
        for gate in gates {
            let expr = parse_feature_expr(gate)?;
            if !self.eval_feature_expr(module, &expr, &HashMap::new())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ===== pass 4: identities =====

    fn compile_identities(
        &mut self,
        created: &[(ModuleId, ModuleDecl)],
    ) -> Result<()> {
        // Create all identities first so bases can point forward, into
        // the same batch.
        for (id, decl) in created {
            for identity in &decl.identities {
                if !self.if_features_satisfied(*id, &identity.if_features)? {
                    continue;
                }
                let name = self.intern(&identity.name);
                let ident = self.ctx.identities.alloc(IdentityDef {
                    module: *id,
                    name,
                    status: identity.status,
                    bases: Vec::new(),
                    derived: Vec::new(),
                });
                self.ctx.modules[*id].identities.push(ident);
            }
        }

        // Link bases.
        for (id, decl) in created {
            for identity in &decl.identities {
                let Some(ident) =
                    self.ctx.find_identity(*id, &identity.name)
                else {
                    continue;
                };
                for base in &identity.bases {
                    let base_id = self
                        .ctx
                        .find_identity(*id, base)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::UnresolvedReference,
                                format!("unknown base identity \"{}\"", base),
                            )
                        })?;
                    let base_status = self.ctx.identities[base_id].status;
                    self.check_status_reference(
                        self.ctx.identities[ident].status,
                        base_status,
                        &format!("identity \"{}\"", identity.name),
                    )?;
                    self.ctx.identities[ident].bases.push(base_id);
                }
            }
        }

        // Reject cycles and memoise the transitive derived sets.
        let count = self.ctx.identities.len();
        let mut children: Vec<Vec<IdentityId>> = vec![Vec::new(); count];
        for (ident, def) in self.ctx.identities.iter() {
            for base in &def.bases {
                children[base.index()].push(ident);
            }
        }
        for ident in self.ctx.identities.ids() {
            let mut visited = HashSet::new();
            let mut derived = Vec::new();
            let mut stack: Vec<IdentityId> =
                children[ident.index()].clone();
            while let Some(current) = stack.pop() {
                if current == ident {
                    return Err(Error::new(
                        ErrorKind::CircularDependency,
                        format!(
                            "identity \"{}\" is derived from itself",
                            self.ctx.resolve(self.ctx.identities[ident].name)
                        ),
                    ));
                }
                if visited.insert(current) {
                    derived.push(current);
                    stack.extend(children[current.index()].iter().copied());
                }
            }
            self.ctx.identities[ident].derived = derived;
        }
        Ok(())
    }

    // ===== pass 3 helper: type compilation =====

    fn find_typedef(
        &self,
        env: Env,
        name: &str,
    ) -> Result<Option<TypeId>> {
        let (module, local) = match name.split_once(':') {
            Some((prefix, local)) => {
                let module = self
                    .ctx
                    .resolve_prefix(env.def, prefix)
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::UnknownModule,
                            format!("unknown prefix \"{}\"", prefix),
                        )
                    })?;
                (module, local)
            }
            None => (env.def, name),
        };
        Ok(self.ctx.modules[module]
            .typedefs
            .iter()
            .find(|(sym, _)| self.ctx.resolve(*sym) == local)
            .map(|(_, ty)| *ty))
    }

    fn compile_type(
        &mut self,
        env: Env,
        decl: &TypeDecl,
        typedef_name: Option<&str>,
        typedef_default: Option<&str>,
        typedef_units: Option<&str>,
    ) -> Result<TypeId> {
        let base = self.find_typedef(env, &decl.name)?;
        let spec = match base {
            Some(base) => {
                let base_spec = self.ctx.types[base].spec.clone();
                self.restrict_spec(base_spec, decl)?
            }
            None => self.compile_builtin_spec(env, decl)?,
        };
        let name = match typedef_name {
            Some(name) => {
                let sym = self.intern(name);
                Some((env.def, sym))
            }
            None => None,
        };
        // Default and units flow down the typedef chain until overridden.
        let default_lexical = typedef_default
            .map(|s| self.ctx.interner.intern(s))
            .or_else(|| base.and_then(|b| self.ctx.types[b].default_lexical));
        let units = typedef_units
            .map(|s| self.ctx.interner.intern(s))
            .or_else(|| base.and_then(|b| self.ctx.types[b].units));
        let id = self.ctx.types.alloc(TypeDef {
            name,
            spec,
            default_lexical,
            units,
        });
        // Validate the typedef default against the finished type. Types
        // referencing data (leafref, instance-identifier) defer to
        // validation time.
        if let Some(default) = typedef_default {
            store_value(self.ctx, env.def, id, default).map_err(|err| {
                Error::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "invalid default \"{}\": {}",
                        default,
                        err.msg.unwrap_or_default()
                    ),
                )
            })?;
        }
        Ok(id)
    }

    fn compile_builtin_spec(
        &mut self,
        env: Env,
        decl: &TypeDecl,
    ) -> Result<TypeSpec> {
        let spec = match decl.name.as_str() {
            "int8" | "int16" | "int32" | "int64" => {
                let width: u8 = decl.name[3..].parse().unwrap();
                let bounds = int_bounds(width);
                let range = match &decl.range {
                    Some(range) => parse_int_ranges(range, bounds)?,
                    None => Ranges::unconstrained(),
                };
                TypeSpec::Int { width, range }
            }
            "uint8" | "uint16" | "uint32" | "uint64" => {
                let width: u8 = decl.name[4..].parse().unwrap();
                let bounds = uint_bounds(width);
                let range = match &decl.range {
                    Some(range) => parse_uint_ranges(range, bounds)?,
                    None => Ranges::unconstrained(),
                };
                TypeSpec::Uint { width, range }
            }
            "decimal64" => {
                let fraction_digits =
                    decl.fraction_digits.ok_or_else(|| {
                        Error::new(
                            ErrorKind::Syntax,
                            "decimal64 requires fraction-digits",
                        )
                    })?;
                if !(1..=18).contains(&fraction_digits) {
                    return Err(Error::new(
                        ErrorKind::Syntax,
                        "fraction-digits must be between 1 and 18",
                    ));
                }
                let range = match &decl.range {
                    Some(range) => parse_dec_ranges(range, fraction_digits)?,
                    None => Ranges::unconstrained(),
                };
                TypeSpec::Decimal64 {
                    fraction_digits,
                    range,
                }
            }
            "string" => {
                let length = match &decl.length {
                    Some(length) => {
                        parse_uint_ranges(length, (0, u64::MAX))?
                    }
                    None => Ranges::unconstrained(),
                };
                let patterns = self.compile_patterns(decl)?;
                TypeSpec::String { length, patterns }
            }
            "boolean" => TypeSpec::Boolean,
            "enumeration" => {
                if decl.enums.is_empty() {
                    return Err(Error::new(
                        ErrorKind::Syntax,
                        "enumeration requires at least one enum",
                    ));
                }
                let mut enums = Vec::new();
                let mut next = 0i32;
                for item in &decl.enums {
                    let value = item.value.unwrap_or(next);
                    let name = self.intern(&item.name);
                    if enums.iter().any(|(sym, _)| *sym == name) {
                        return Err(Error::new(
                            ErrorKind::DuplicateIdentifier,
                            format!("duplicate enum \"{}\"", item.name),
                        ));
                    }
                    enums.push((name, value));
                    next = value.saturating_add(1);
                }
                TypeSpec::Enumeration { enums }
            }
            "bits" => {
                let mut bits = Vec::new();
                let mut next = 0u32;
                for bit in &decl.bits {
                    let position = bit.position.unwrap_or(next);
                    let name = self.intern(&bit.name);
                    if bits
                        .iter()
                        .any(|(sym, pos)| *sym == name || *pos == position)
                    {
                        return Err(Error::new(
                            ErrorKind::DuplicateIdentifier,
                            format!("duplicate bit \"{}\"", bit.name),
                        ));
                    }
                    bits.push((name, position));
                    next = position.saturating_add(1);
                }
                TypeSpec::Bits { bits }
            }
            "binary" => {
                let length = match &decl.length {
                    Some(length) => {
                        parse_uint_ranges(length, (0, u64::MAX))?
                    }
                    None => Ranges::unconstrained(),
                };
                TypeSpec::Binary { length }
            }
            "leafref" => {
                let path = decl.path.as_ref().ok_or_else(|| {
                    Error::new(ErrorKind::Syntax, "leafref requires a path")
                })?;
                let expr = XPathExpr::compile(path)?;
                TypeSpec::Leafref {
                    path: Box::new(expr),
                    path_module: env.def,
                    require_instance: decl.require_instance.unwrap_or(true),
                    target: None,
                    real_type: None,
                }
            }
            "identityref" => {
                if decl.bases.is_empty() {
                    return Err(Error::new(
                        ErrorKind::Syntax,
                        "identityref requires at least one base",
                    ));
                }
                let mut bases = Vec::new();
                for base in &decl.bases {
                    let ident = self
                        .ctx
                        .find_identity(env.def, base)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::UnresolvedReference,
                                format!("unknown base identity \"{}\"", base),
                            )
                        })?;
                    bases.push(ident);
                }
                TypeSpec::Identityref { bases }
            }
            "instance-identifier" => TypeSpec::InstanceIdentifier {
                require_instance: decl.require_instance.unwrap_or(true),
            },
            "empty" => TypeSpec::Empty,
            "union" => {
                if decl.members.is_empty() {
                    return Err(Error::new(
                        ErrorKind::Syntax,
                        "union requires at least one member type",
                    ));
                }
                let mut members = Vec::new();
                for member in &decl.members {
                    members.push(
                        self.compile_type(env, member, None, None, None)?,
                    );
                }
                TypeSpec::Union { members }
            }
            other => {
                return Err(Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("unknown type \"{}\"", other),
                ));
            }
        };
        Ok(spec)
    }

    fn compile_patterns(
        &mut self,
        decl: &TypeDecl,
    ) -> Result<Vec<PatternSpec>> {
        let mut patterns = Vec::new();
        for pattern in &decl.patterns {
            let translated = xsd_regex_to_rust(&pattern.pattern);
            let regex = regex::Regex::new(&translated).map_err(|err| {
                Error::new(
                    ErrorKind::Syntax,
                    format!(
                        "invalid pattern \"{}\": {}",
                        pattern.pattern, err
                    ),
                )
            })?;
            let source = self.intern(&pattern.pattern);
            patterns.push(PatternSpec {
                regex,
                source,
                invert: pattern.invert_match,
            });
        }
        Ok(patterns)
    }

    /// Apply a restriction statement to a typedef-derived spec: ranges
    /// and lengths must lie within the base, patterns accumulate, and a
    /// derived enumeration/bits may only remove members while keeping
    /// their base values/positions.
    fn restrict_spec(
        &mut self,
        base: TypeSpec,
        decl: &TypeDecl,
    ) -> Result<TypeSpec> {
        let range_err = || {
            Error::new(
                ErrorKind::Syntax,
                "derived range is not a subset of the base range",
            )
        };
        match base {
            TypeSpec::Int { width, range } => {
                let range = match &decl.range {
                    Some(spec) => {
                        let bounds = match (range.min(), range.max()) {
                            (Some(min), Some(max)) => (min, max),
                            _ => int_bounds(width),
                        };
                        let derived = parse_int_ranges(spec, bounds)?;
                        if !range.covers(&derived) {
                            return Err(range_err());
                        }
                        range.restrict(derived)
                    }
                    None => range,
                };
                Ok(TypeSpec::Int { width, range })
            }
            TypeSpec::Uint { width, range } => {
                let range = match &decl.range {
                    Some(spec) => {
                        let bounds = match (range.min(), range.max()) {
                            (Some(min), Some(max)) => (min, max),
                            _ => uint_bounds(width),
                        };
                        let derived = parse_uint_ranges(spec, bounds)?;
                        if !range.covers(&derived) {
                            return Err(range_err());
                        }
                        range.restrict(derived)
                    }
                    None => range,
                };
                Ok(TypeSpec::Uint { width, range })
            }
            TypeSpec::Decimal64 {
                fraction_digits,
                range,
            } => {
                let range = match &decl.range {
                    Some(spec) => {
                        let derived =
                            parse_dec_ranges(spec, fraction_digits)?;
                        if !range.covers(&derived) {
                            return Err(range_err());
                        }
                        range.restrict(derived)
                    }
                    None => range,
                };
                Ok(TypeSpec::Decimal64 {
                    fraction_digits,
                    range,
                })
            }
            TypeSpec::String {
                length,
                mut patterns,
            } => {
                let length = match &decl.length {
                    Some(spec) => {
                        let derived = parse_uint_ranges(spec, (0, u64::MAX))?;
                        if !length.covers(&derived) {
                            return Err(range_err());
                        }
                        length.restrict(derived)
                    }
                    None => length,
                };
                patterns.extend(self.compile_patterns(decl)?);
                Ok(TypeSpec::String { length, patterns })
            }
            TypeSpec::Binary { length } => {
                let length = match &decl.length {
                    Some(spec) => {
                        let derived = parse_uint_ranges(spec, (0, u64::MAX))?;
                        if !length.covers(&derived) {
                            return Err(range_err());
                        }
                        length.restrict(derived)
                    }
                    None => length,
                };
                Ok(TypeSpec::Binary { length })
            }
            TypeSpec::Enumeration { enums } => {
                if decl.enums.is_empty() {
                    return Ok(TypeSpec::Enumeration { enums });
                }
                let mut restricted = Vec::new();
                for item in &decl.enums {
                    let name = self.intern(&item.name);
                    let base_entry = enums
                        .iter()
                        .find(|(sym, _)| *sym == name)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::InvalidEnum,
                                format!(
                                    "enum \"{}\" not present in base type",
                                    item.name
                                ),
                            )
                        })?;
                    if let Some(value) = item.value {
                        if value != base_entry.1 {
                            return Err(Error::new(
                                ErrorKind::InvalidEnum,
                                format!(
                                    "enum \"{}\" must keep base value {}",
                                    item.name, base_entry.1
                                ),
                            ));
                        }
                    }
                    restricted.push(*base_entry);
                }
                Ok(TypeSpec::Enumeration { enums: restricted })
            }
            TypeSpec::Bits { bits } => {
                if decl.bits.is_empty() {
                    return Ok(TypeSpec::Bits { bits });
                }
                let mut restricted = Vec::new();
                for bit in &decl.bits {
                    let name = self.intern(&bit.name);
                    let base_entry = bits
                        .iter()
                        .find(|(sym, _)| *sym == name)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::InvalidEnum,
                                format!(
                                    "bit \"{}\" not present in base type",
                                    bit.name
                                ),
                            )
                        })?;
                    if let Some(position) = bit.position {
                        if position != base_entry.1 {
                            return Err(Error::new(
                                ErrorKind::InvalidEnum,
                                format!(
                                    "bit \"{}\" must keep base position {}",
                                    bit.name, base_entry.1
                                ),
                            ));
                        }
                    }
                    restricted.push(*base_entry);
                }
                Ok(TypeSpec::Bits { bits: restricted })
            }
            // Leafref, identityref, instance-identifier, empty, boolean
            // and unions accept no further restrictions here beyond
            // require-instance.
            TypeSpec::Leafref {
                path,
                path_module,
                require_instance,
                target,
                real_type,
            } => Ok(TypeSpec::Leafref {
                path,
                path_module,
                require_instance: decl
                    .require_instance
                    .unwrap_or(require_instance),
                target,
                real_type,
            }),
            TypeSpec::InstanceIdentifier { require_instance } => {
                Ok(TypeSpec::InstanceIdentifier {
                    require_instance: decl
                        .require_instance
                        .unwrap_or(require_instance),
                })
            }
            other => Ok(other),
        }
    }

    // ===== pass 5: tree compilation =====

    fn compile_module_tree(
        &mut self,
        id: ModuleId,
        decl: &ModuleDecl,
    ) -> Result<()> {
        let env = self.module_env(id);
        for node in &decl.data {
            self.compile_node(env, None, node)?;
        }
        Ok(())
    }

    /// Compile one data-def statement under `parent` (`None` links the
    /// node at module top level). Returns `None` when the node is gated
    /// out by an if-feature.
    fn compile_node(
        &mut self,
        env: Env,
        parent: Option<SnodeId>,
        decl: &DataDecl,
    ) -> Result<Option<SnodeId>> {
        if !self.if_features_satisfied(env.def, &decl.if_features)? {
            return Ok(None);
        }

        if decl.kind == DataDeclKind::Uses {
            return self.expand_uses(env, parent, decl).map(|_| None);
        }

        let kind = match decl.kind {
            DataDeclKind::Container => SchemaNodeKind::Container,
            DataDeclKind::List => SchemaNodeKind::List,
            DataDeclKind::Leaf => SchemaNodeKind::Leaf,
            DataDeclKind::LeafList => SchemaNodeKind::LeafList,
            DataDeclKind::Choice => SchemaNodeKind::Choice,
            DataDeclKind::Case => SchemaNodeKind::Case,
            DataDeclKind::AnyData => SchemaNodeKind::AnyData,
            DataDeclKind::AnyXml => SchemaNodeKind::AnyXml,
            DataDeclKind::Rpc => SchemaNodeKind::Rpc,
            DataDeclKind::Action => SchemaNodeKind::Action,
            DataDeclKind::Notification => SchemaNodeKind::Notification,
            DataDeclKind::Uses => unreachable!(),
        };

        // Config inheritance; explicit config true under a state parent
        // is rejected.
        let config = match decl.config {
            Some(true) if !env.config => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "node \"{}\": config true under a state parent",
                        decl.name
                    ),
                ));
            }
            Some(config) => config,
            None => env.config,
        };
        let status = decl.status.max(env.status);

        let mut flags = env.flags
            & (SchemaFlags::IS_INPUT
                | SchemaFlags::IS_OUTPUT
                | SchemaFlags::IS_NOTIF);
        if matches!(
            kind,
            SchemaNodeKind::Rpc
                | SchemaNodeKind::Action
                | SchemaNodeKind::Notification
        ) {
            // Operations are neither config nor state themselves.
        } else if env.flags.contains(SchemaFlags::IS_OUTPUT)
            || env.flags.contains(SchemaFlags::IS_NOTIF)
        {
            flags |= SchemaFlags::CONFIG_R;
        } else if config {
            flags |= SchemaFlags::CONFIG_W;
        } else {
            flags |= SchemaFlags::CONFIG_R;
        }
        if decl.mandatory == Some(true) {
            flags |= SchemaFlags::MAND_TRUE;
        }
        if decl.ordered_by_user {
            flags |= SchemaFlags::ORDBY_USER;
        }

        let name = self.intern(&decl.name);
        let description = self.intern_opt(&decl.description);
        let reference = self.intern_opt(&decl.reference);

        // Sibling uniqueness inside the module scope.
        let mut sibling = match parent {
            Some(parent) => self.ctx.snodes[parent].first_child,
            None => self.module_chain_head(env.ns, kind),
        };
        let mut last = None;
        while let Some(id) = sibling {
            let snode = &self.ctx.snodes[id];
            if snode.name == name && snode.module == env.ns {
                return Err(Error::new(
                    ErrorKind::DuplicateIdentifier,
                    format!("duplicate node name \"{}\"", decl.name),
                ));
            }
            last = Some(id);
            sibling = snode.next;
        }

        let whens = match &decl.when {
            Some(when) => vec![self.compile_when(
                env,
                when,
                matches!(
                    kind,
                    SchemaNodeKind::Choice | SchemaNodeKind::Case
                ),
            )],
            None => Vec::new(),
        };
        let musts = decl
            .musts
            .iter()
            .map(|must| self.compile_must(env, must))
            .collect::<Result<Vec<_>>>()?;
        let whens = whens.into_iter().collect::<Result<Vec<_>>>()?;

        let exts = decl
            .exts
            .iter()
            .map(|ext| {
                let def_module = self.ctx.interner.intern(&ext.module);
                let name = self.ctx.interner.intern(&ext.name);
                let revision =
                    ext.revision.as_ref().map(|r| self.ctx.interner.intern(r));
                let argument =
                    ext.argument.as_ref().map(|a| self.ctx.interner.intern(a));
                ExtInstance {
                    def_module,
                    name,
                    revision,
                    argument,
                }
            })
            .collect();

        let payload = self.compile_payload(env, decl, kind, config)?;
        match &payload {
            SnodePayload::Leaf(leaf) if leaf.default.is_some() => {
                flags |= SchemaFlags::SET_DFLT;
            }
            SnodePayload::LeafList(leaflist)
                if !leaflist.defaults.is_empty() =>
            {
                flags |= SchemaFlags::SET_DFLT;
            }
            _ => (),
        }

        let id = self.ctx.snodes.alloc(Snode {
            kind,
            name,
            module: env.ns,
            parent,
            prev: last,
            next: None,
            first_child: None,
            flags,
            status,
            description,
            reference,
            whens,
            musts,
            exts,
            template: None,
            payload,
        });

        // Link into the sibling chain.
        match last {
            Some(last) => self.ctx.snodes[last].next = Some(id),
            None => match parent {
                Some(parent) => {
                    self.ctx.snodes[parent].first_child = Some(id)
                }
                None => self.set_module_chain_head(env.ns, kind, id),
            },
        }

        // Children.
        let child_env = Env {
            ns: env.ns,
            def: env.def,
            config,
            status,
            flags: flags
                & (SchemaFlags::IS_INPUT
                    | SchemaFlags::IS_OUTPUT
                    | SchemaFlags::IS_NOTIF),
        };
        match kind {
            SchemaNodeKind::Rpc | SchemaNodeKind::Action => {
                self.compile_operation_io(child_env, id, decl)?;
            }
            SchemaNodeKind::Notification => {
                let env = Env {
                    flags: child_env.flags | SchemaFlags::IS_NOTIF,
                    config: false,
                    ..child_env
                };
                for child in &decl.children {
                    self.compile_node(env, Some(id), child)?;
                }
            }
            SchemaNodeKind::Choice => {
                for child in &decl.children {
                    // Shorthand: non-case children get an implicit case.
                    if child.kind == DataDeclKind::Case {
                        self.compile_node(child_env, Some(id), child)?;
                    } else {
                        let mut case =
                            DataDecl::case(&child.name);
                        case.children.push(child.clone());
                        self.compile_node(child_env, Some(id), &case)?;
                    }
                }
                self.resolve_choice_default(id, decl)?;
            }
            _ => {
                for child in &decl.children {
                    self.compile_node(child_env, Some(id), child)?;
                }
            }
        }

        // List post-processing: keys and uniques name existing children.
        if kind == SchemaNodeKind::List {
            self.resolve_list_keys(env, id, decl, config)?;
        }

        Ok(Some(id))
    }

    fn module_chain_head(
        &self,
        module: ModuleId,
        kind: SchemaNodeKind,
    ) -> Option<SnodeId> {
        let mdata = &self.ctx.modules[module];
        match kind {
            SchemaNodeKind::Rpc => mdata.rpcs,
            SchemaNodeKind::Notification => mdata.notifications,
            _ => mdata.data,
        }
    }

    fn set_module_chain_head(
        &mut self,
        module: ModuleId,
        kind: SchemaNodeKind,
        id: SnodeId,
    ) {
        let mdata = &mut self.ctx.modules[module];
        match kind {
            SchemaNodeKind::Rpc => mdata.rpcs = Some(id),
            SchemaNodeKind::Notification => mdata.notifications = Some(id),
            _ => mdata.data = Some(id),
        }
    }

    fn compile_operation_io(
        &mut self,
        env: Env,
        operation: SnodeId,
        decl: &DataDecl,
    ) -> Result<()> {
        for (output, children) in [(false, &decl.input), (true, &decl.output)]
        {
            let (kind, payload, flag, name) = if output {
                (
                    SchemaNodeKind::Output,
                    SnodePayload::Output,
                    SchemaFlags::IS_OUTPUT | SchemaFlags::CONFIG_R,
                    "output",
                )
            } else {
                (
                    SchemaNodeKind::Input,
                    SnodePayload::Input,
                    SchemaFlags::IS_INPUT | SchemaFlags::CONFIG_W,
                    "input",
                )
            };
            let name = self.intern(name);
            let io = self.ctx.snodes.alloc(Snode {
                kind,
                name,
                module: env.ns,
                parent: Some(operation),
                prev: None,
                next: None,
                first_child: None,
                flags: flag,
                status: env.status,
                description: None,
                reference: None,
                whens: Vec::new(),
                musts: Vec::new(),
                exts: Vec::new(),
                template: None,
                payload,
            });
            // Input first, output second.
            match self.ctx.snodes[operation].first_child {
                None => self.ctx.snodes[operation].first_child = Some(io),
                Some(first) => {
                    self.ctx.snodes[io].prev = Some(first);
                    self.ctx.snodes[first].next = Some(io);
                }
            }
            let child_env = Env {
                config: !output,
                flags: flag,
                ..env
            };
            for child in children {
                self.compile_node(child_env, Some(io), child)?;
            }
        }
        Ok(())
    }

    fn compile_payload(
        &mut self,
        env: Env,
        decl: &DataDecl,
        kind: SchemaNodeKind,
        config: bool,
    ) -> Result<SnodePayload> {
        let _ = config;
        Ok(match kind {
            SchemaNodeKind::Container => SnodePayload::Container {
                presence: decl.presence,
            },
            SchemaNodeKind::List => SnodePayload::List(ListPayload {
                keys: Vec::new(),
                uniques: Vec::new(),
                min: decl.min_elements.unwrap_or(0),
                max: decl.max_elements.unwrap_or(u32::MAX),
            }),
            SchemaNodeKind::Leaf => {
                let type_decl = decl.type_.as_ref().ok_or_else(|| {
                    Error::new(
                        ErrorKind::Syntax,
                        format!("leaf \"{}\" requires a type", decl.name),
                    )
                })?;
                let ty =
                    self.compile_type(env, type_decl, None, None, None)?;
                let ty = self.clone_if_leafref(ty);
                let default = self.leaf_default(
                    env,
                    ty,
                    decl.default.as_deref(),
                    decl.mandatory == Some(true),
                )?;
                let units = decl
                    .units
                    .as_ref()
                    .map(|units| self.ctx.interner.intern(units))
                    .or(self.ctx.types[ty].units);
                SnodePayload::Leaf(LeafPayload { ty, default, units })
            }
            SchemaNodeKind::LeafList => {
                let type_decl = decl.type_.as_ref().ok_or_else(|| {
                    Error::new(
                        ErrorKind::Syntax,
                        format!(
                            "leaf-list \"{}\" requires a type",
                            decl.name
                        ),
                    )
                })?;
                let ty =
                    self.compile_type(env, type_decl, None, None, None)?;
                let ty = self.clone_if_leafref(ty);
                let mut defaults = Vec::new();
                for default in &decl.defaults {
                    defaults.push(self.store_schema_value(
                        env, ty, default,
                    )?);
                }
                let units = decl
                    .units
                    .as_ref()
                    .map(|units| self.ctx.interner.intern(units))
                    .or(self.ctx.types[ty].units);
                SnodePayload::LeafList(LeafListPayload {
                    ty,
                    defaults,
                    min: decl.min_elements.unwrap_or(0),
                    max: decl.max_elements.unwrap_or(u32::MAX),
                    units,
                })
            }
            SchemaNodeKind::Choice => SnodePayload::Choice {
                default_case: None,
            },
            SchemaNodeKind::Case => SnodePayload::Case,
            SchemaNodeKind::AnyData => SnodePayload::AnyData,
            SchemaNodeKind::AnyXml => SnodePayload::AnyXml,
            SchemaNodeKind::Rpc => SnodePayload::Rpc,
            SchemaNodeKind::Action => SnodePayload::Action,
            SchemaNodeKind::Input => SnodePayload::Input,
            SchemaNodeKind::Output => SnodePayload::Output,
            SchemaNodeKind::Notification => SnodePayload::Notification,
        })
    }

    /// Leafref (and leafref-carrying union) types resolve their target
    /// per use site, so each leaf gets its own copy.
    fn clone_if_leafref(&mut self, ty: TypeId) -> TypeId {
        fn contains_leafref(ctx: &Context, ty: TypeId) -> bool {
            match &ctx.types[ty].spec {
                TypeSpec::Leafref { .. } => true,
                TypeSpec::Union { members } => members
                    .iter()
                    .any(|member| contains_leafref(ctx, *member)),
                _ => false,
            }
        }
        if !contains_leafref(self.ctx, ty) {
            return ty;
        }
        let mut def = self.ctx.types[ty].clone();
        if let TypeSpec::Union { members } = &mut def.spec {
            let members = members.clone();
            let cloned: Vec<TypeId> = members
                .into_iter()
                .map(|member| self.clone_if_leafref(member))
                .collect();
            def.spec = TypeSpec::Union { members: cloned };
        }
        self.ctx.types.alloc(def)
    }

    fn store_schema_value(
        &self,
        env: Env,
        ty: TypeId,
        lexical: &str,
    ) -> Result<StoredValue> {
        store_value(self.ctx, env.def, ty, lexical)
    }

    fn leaf_default(
        &mut self,
        env: Env,
        ty: TypeId,
        explicit: Option<&str>,
        mandatory: bool,
    ) -> Result<Option<StoredValue>> {
        if mandatory {
            if explicit.is_some() {
                return Err(Error::new(
                    ErrorKind::Syntax,
                    "a mandatory leaf cannot have a default",
                ));
            }
            return Ok(None);
        }
        let lexical = match explicit {
            Some(lexical) => Some(lexical.to_string()),
            None => self.ctx.types[ty]
                .default_lexical
                .map(|sym| self.ctx.resolve(sym).to_string()),
        };
        match lexical {
            Some(lexical) => {
                Ok(Some(self.store_schema_value(env, ty, &lexical)?))
            }
            None => Ok(None),
        }
    }

    fn compile_when(
        &mut self,
        env: Env,
        decl: &WhenDecl,
        ctx_is_parent: bool,
    ) -> Result<WhenSpec> {
        let expr = XPathExpr::compile(&decl.expr)?;
        Ok(WhenSpec {
            expr,
            module: env.def,
            ctx_is_parent,
            description: self.intern_opt(&decl.description),
            reference: self.intern_opt(&decl.reference),
        })
    }

    fn compile_must(&mut self, env: Env, decl: &MustDecl) -> Result<MustSpec> {
        let expr = XPathExpr::compile(&decl.expr)?;
        Ok(MustSpec {
            expr,
            module: env.def,
            emsg: self.intern_opt(&decl.error_message),
            eapptag: self.intern_opt(&decl.error_app_tag),
            description: self.intern_opt(&decl.description),
            reference: self.intern_opt(&decl.reference),
        })
    }

    fn resolve_choice_default(
        &mut self,
        choice: SnodeId,
        decl: &DataDecl,
    ) -> Result<()> {
        let Some(default) = &decl.default_case else {
            return Ok(());
        };
        if decl.mandatory == Some(true) {
            return Err(Error::new(
                ErrorKind::Syntax,
                "a mandatory choice cannot have a default case",
            ));
        }
        let sym = self.ctx.interner.lookup(default);
        let target = sym.and_then(|sym| {
            self.ctx
                .schild_iter(self.ctx.snodes[choice].first_child)
                .find(|id| self.ctx.snodes[*id].name == sym)
        });
        match target {
            Some(case) => {
                self.ctx.snodes[choice].payload = SnodePayload::Choice {
                    default_case: Some(case),
                };
                self.ctx.snodes[case].flags |= SchemaFlags::SET_DFLT;
                Ok(())
            }
            None => Err(Error::new(
                ErrorKind::UnresolvedReference,
                format!("default case \"{}\" not found", default),
            )),
        }
    }

    fn resolve_list_keys(
        &mut self,
        env: Env,
        list: SnodeId,
        decl: &DataDecl,
        config: bool,
    ) -> Result<()> {
        let mut keys = Vec::new();
        for key in &decl.keys {
            let sym = self.ctx.interner.lookup(key);
            let child = sym.and_then(|sym| {
                self.ctx
                    .schild_iter(self.ctx.snodes[list].first_child)
                    .find(|id| {
                        self.ctx.snodes[*id].name == sym
                            && self.ctx.snodes[*id].kind
                                == SchemaNodeKind::Leaf
                    })
            });
            let child = child.ok_or_else(|| {
                Error::new(
                    ErrorKind::ListKey,
                    format!(
                        "list \"{}\": key \"{}\" is not a leaf child",
                        decl.name, key
                    ),
                )
            })?;
            // Keys are implicitly mandatory and share the list's config.
            let child_node = &mut self.ctx.snodes[child];
            child_node.flags |= SchemaFlags::KEY | SchemaFlags::MAND_TRUE;
            if let SnodePayload::Leaf(leaf) = &mut child_node.payload {
                leaf.default = None;
            }
            keys.push(child);
        }
        if keys.is_empty() {
            if config {
                return Err(Error::new(
                    ErrorKind::ListKey,
                    format!(
                        "configuration list \"{}\" requires a key",
                        decl.name
                    ),
                ));
            }
            self.ctx.snodes[list].flags |= SchemaFlags::KEYLESS;
        }

        let mut uniques = Vec::new();
        for unique in &decl.uniques {
            let mut leaves = Vec::new();
            for path in unique {
                let leaf =
                    self.resolve_descendant_leaf(env, list, path)?;
                leaves.push(leaf);
            }
            uniques.push(leaves);
        }

        if let SnodePayload::List(payload) = &mut self.ctx.snodes[list].payload
        {
            payload.keys = keys;
            payload.uniques = uniques;
        }
        Ok(())
    }

    fn resolve_descendant_leaf(
        &self,
        env: Env,
        from: SnodeId,
        path: &str,
    ) -> Result<SnodeId> {
        let mut current = from;
        for segment in path.split('/') {
            let name = match segment.split_once(':') {
                Some((_, local)) => local,
                None => segment,
            };
            let sym = self.ctx.interner.lookup(name);
            let next = sym.and_then(|sym| {
                self.ctx
                    .data_children(Some(current), env.ns, false)
                    .into_iter()
                    .find(|id| self.ctx.snodes[*id].name == sym)
            });
            current = next.ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("unique path \"{}\" does not resolve", path),
                )
            })?;
        }
        if self.ctx.snodes[current].kind != SchemaNodeKind::Leaf {
            return Err(Error::new(
                ErrorKind::UnresolvedReference,
                format!("unique path \"{}\" is not a leaf", path),
            ));
        }
        Ok(current)
    }

    // ===== pass 5: uses expansion =====

    fn find_grouping(
        &self,
        env: Env,
        name: &str,
    ) -> Result<(ModuleId, crate::builder::GroupingDecl)> {
        let (module, local) = match name.split_once(':') {
            Some((prefix, local)) => {
                let module = self
                    .ctx
                    .resolve_prefix(env.def, prefix)
                    .ok_or_else(|| {
                        Error::new(
                            ErrorKind::UnknownModule,
                            format!("unknown prefix \"{}\"", prefix),
                        )
                    })?;
                (module, local)
            }
            None => (env.def, name),
        };
        self.ctx.modules[module]
            .groupings
            .iter()
            .find(|grouping| grouping.name == local)
            .cloned()
            .map(|grouping| (module, grouping))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("unknown grouping \"{}\"", name),
                )
            })
    }

    /// Expand a `uses`: deep-copy the grouping's children, apply refines,
    /// compile the copies under the parent, then process nested augments.
    fn expand_uses(
        &mut self,
        env: Env,
        parent: Option<SnodeId>,
        decl: &DataDecl,
    ) -> Result<()> {
        let name = decl.grouping.as_deref().unwrap_or(&decl.name);
        let (grouping_module, grouping) = self.find_grouping(env, name)?;
        let template = self.intern(grouping.name.as_str());

        // Deep copy with refines applied to the targeted descendants.
        let mut children = grouping.children.clone();
        for refine in &decl.refines {
            apply_refine(&mut children, refine)?;
        }

        // Names inside the grouping resolve where the grouping was
        // defined; the expanded nodes belong to the using module.
        let expand_env = Env {
            ns: env.ns,
            def: grouping_module,
            ..env
        };
        let mut expanded = Vec::new();
        for child in &children {
            if let Some(id) = self.compile_node(expand_env, parent, child)? {
                expanded.push(id);
            }
        }

        // The when of the uses applies to every expanded top node, with
        // the parent as XPath context.
        if let Some(when) = &decl.when {
            let spec = self.compile_when(env, when, true)?;
            for id in &expanded {
                self.ctx.snodes[*id].whens.push(spec.clone());
            }
        }
        for id in &expanded {
            self.ctx.snodes[*id].template = Some(template);
        }

        // Nested augments extend the expanded subtree.
        for augment in &decl.uses_augments {
            if !self.if_features_satisfied(env.def, &augment.if_features)? {
                continue;
            }
            let target =
                self.resolve_uses_augment_target(&expanded, &augment.target)?;
            self.graft_augment(env, target, augment)?;
        }
        Ok(())
    }

    fn resolve_uses_augment_target(
        &self,
        expanded: &[SnodeId],
        path: &str,
    ) -> Result<SnodeId> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next().ok_or_else(|| {
            Error::new(ErrorKind::Syntax, "empty augment target")
        })?;
        let first_name = first.split_once(':').map_or(first, |(_, n)| n);
        let mut current = expanded
            .iter()
            .copied()
            .find(|id| {
                self.ctx.resolve(self.ctx.snodes[*id].name) == first_name
            })
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("augment target \"{}\" not found", path),
                )
            })?;
        for segment in segments {
            let name = segment.split_once(':').map_or(segment, |(_, n)| n);
            current = self
                .ctx
                .schild_iter(self.ctx.snodes[current].first_child)
                .find(|id| self.ctx.resolve(self.ctx.snodes[*id].name) == name)
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::UnresolvedReference,
                        format!("augment target \"{}\" not found", path),
                    )
                })?;
        }
        Ok(current)
    }

    // ===== pass 6: augments =====

    fn resolve_schema_path(
        &self,
        module: ModuleId,
        path: &str,
    ) -> Result<SnodeId> {
        let mut current: Option<SnodeId> = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let (target_module, name) = match segment.split_once(':') {
                Some((prefix, local)) => {
                    let target = self
                        .ctx
                        .resolve_prefix(module, prefix)
                        .ok_or_else(|| {
                            Error::new(
                                ErrorKind::UnknownModule,
                                format!("unknown prefix \"{}\"", prefix),
                            )
                        })?;
                    (target, local)
                }
                None => match current {
                    Some(id) => (self.ctx.snodes[id].module, segment),
                    None => (module, segment),
                },
            };
            let sym = self.ctx.interner.lookup(name);
            let next = sym.and_then(|sym| {
                let mdata = &self.ctx.modules[target_module];
                let heads = match current {
                    Some(id) => vec![self.ctx.snodes[id].first_child],
                    None => {
                        vec![mdata.data, mdata.rpcs, mdata.notifications]
                    }
                };
                heads.into_iter().flatten().find_map(|head| {
                    self.ctx
                        .schild_iter(Some(head))
                        .find(|id| {
                            let snode = &self.ctx.snodes[*id];
                            snode.name == sym
                                && snode.module == target_module
                        })
                })
            });
            current = Some(next.ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!("schema path \"{}\" does not resolve", path),
                )
            })?);
        }
        current.ok_or_else(|| {
            Error::new(ErrorKind::Syntax, "empty schema path")
        })
    }

    fn apply_augment(
        &mut self,
        module: ModuleId,
        augment: &AugmentDecl,
    ) -> Result<()> {
        if !self.if_features_satisfied(module, &augment.if_features)? {
            return Ok(());
        }
        let target = self.resolve_schema_path(module, &augment.target)?;
        match self.ctx.snodes[target].kind {
            SchemaNodeKind::Container
            | SchemaNodeKind::List
            | SchemaNodeKind::Choice
            | SchemaNodeKind::Case
            | SchemaNodeKind::Input
            | SchemaNodeKind::Output
            | SchemaNodeKind::Notification => (),
            _ => {
                return Err(Error::new(
                    ErrorKind::UnresolvedReference,
                    format!(
                        "augment target \"{}\" cannot be augmented",
                        augment.target
                    ),
                ));
            }
        }
        let env = Env {
            ns: module,
            def: module,
            config: self.ctx.snodes[target]
                .flags
                .contains(SchemaFlags::CONFIG_W),
            status: self.ctx.snodes[target].status,
            flags: self.ctx.snodes[target].flags
                & (SchemaFlags::IS_INPUT
                    | SchemaFlags::IS_OUTPUT
                    | SchemaFlags::IS_NOTIF),
        };
        self.graft_augment_checked(env, target, augment)
    }

    fn graft_augment_checked(
        &mut self,
        env: Env,
        target: SnodeId,
        augment: &AugmentDecl,
    ) -> Result<()> {
        // Conflicting names at the graft point fail.
        for child in &augment.children {
            let exists = self
                .ctx
                .schild_iter(self.ctx.snodes[target].first_child)
                .any(|id| {
                    self.ctx.resolve(self.ctx.snodes[id].name) == child.name
                });
            if exists {
                return Err(Error::new(
                    ErrorKind::DuplicateIdentifier,
                    format!(
                        "augment of \"{}\": node \"{}\" already exists",
                        augment.target, child.name
                    ),
                ));
            }
        }
        // Grafting mutates a pre-existing subtree; log it for rollback.
        self.undo_touch_chain(target);
        self.graft_augment(env, target, augment)
    }

    fn undo_touch_chain(&mut self, target: SnodeId) {
        let (snap, ctx) = (&self.snap, &*self.ctx);
        self.undo.touch_snode(ctx, snap, target);
        let mut child = ctx.snodes[target].first_child;
        let mut last = None;
        while let Some(id) = child {
            last = Some(id);
            child = ctx.snodes[id].next;
        }
        if let Some(last) = last {
            self.undo.touch_snode(ctx, snap, last);
        }
    }

    fn graft_augment(
        &mut self,
        env: Env,
        target: SnodeId,
        augment: &AugmentDecl,
    ) -> Result<()> {
        let when = match &augment.when {
            Some(when) => Some(self.compile_when(env, when, true)?),
            None => None,
        };
        for child in &augment.children {
            let id = self.compile_node(env, Some(target), child)?;
            if let (Some(id), Some(when)) = (id, &when) {
                self.ctx.snodes[id].whens.push(when.clone());
            }
        }
        Ok(())
    }

    // ===== pass 7: deviations =====

    fn apply_deviation(
        &mut self,
        module: ModuleId,
        deviation: &DeviationDecl,
    ) -> Result<()> {
        let target = self
            .resolve_schema_path(module, &deviation.target)
            .map_err(|mut err| {
                err.kind = ErrorKind::UnresolvedReference;
                err
            })?;
        for deviate in &deviation.deviates {
            match deviate {
                DeviateDecl::NotSupported => {
                    self.remove_snode(target);
                    return Ok(());
                }
                DeviateDecl::Add(fields)
                | DeviateDecl::Replace(fields) => {
                    self.deviate_apply(module, target, fields, false)?;
                }
                DeviateDecl::Delete(fields) => {
                    self.deviate_apply(module, target, fields, true)?;
                }
            }
        }
        Ok(())
    }

    fn remove_snode(&mut self, target: SnodeId) {
        let (parent, prev, next, module, kind) = {
            let snode = &self.ctx.snodes[target];
            (
                snode.parent,
                snode.prev,
                snode.next,
                snode.module,
                snode.kind,
            )
        };
        if let Some(prev) = prev {
            self.undo
                .touch_snode(self.ctx, &self.snap, prev);
            self.ctx.snodes[prev].next = next;
        }
        if let Some(next) = next {
            self.undo
                .touch_snode(self.ctx, &self.snap, next);
            self.ctx.snodes[next].prev = prev;
        }
        match parent {
            Some(parent) => {
                self.undo.touch_snode(self.ctx, &self.snap, parent);
                if self.ctx.snodes[parent].first_child == Some(target) {
                    self.ctx.snodes[parent].first_child = next;
                }
            }
            None => {
                self.undo.touch_module(self.ctx, &self.snap, module);
                let mdata = &mut self.ctx.modules[module];
                match kind {
                    SchemaNodeKind::Rpc => {
                        if mdata.rpcs == Some(target) {
                            mdata.rpcs = next;
                        }
                    }
                    SchemaNodeKind::Notification => {
                        if mdata.notifications == Some(target) {
                            mdata.notifications = next;
                        }
                    }
                    _ => {
                        if mdata.data == Some(target) {
                            mdata.data = next;
                        }
                    }
                }
            }
        }
    }

    fn deviate_apply(
        &mut self,
        module: ModuleId,
        target: SnodeId,
        fields: &DeviateFields,
        delete: bool,
    ) -> Result<()> {
        self.undo.touch_snode(self.ctx, &self.snap, target);
        let env = Env {
            ns: module,
            def: module,
            config: true,
            status: Status::Current,
            flags: SchemaFlags::empty(),
        };

        if let Some(config) = fields.config {
            let snode = &mut self.ctx.snodes[target];
            snode.flags.remove(
                SchemaFlags::CONFIG_W | SchemaFlags::CONFIG_R,
            );
            snode.flags |= if config {
                SchemaFlags::CONFIG_W
            } else {
                SchemaFlags::CONFIG_R
            };
        }
        if let Some(mandatory) = fields.mandatory {
            let snode = &mut self.ctx.snodes[target];
            if mandatory && !delete {
                snode.flags |= SchemaFlags::MAND_TRUE;
            } else {
                snode.flags.remove(SchemaFlags::MAND_TRUE);
            }
        }
        if let Some(units) = &fields.units {
            let sym = self.intern(units);
            match &mut self.ctx.snodes[target].payload {
                SnodePayload::Leaf(leaf) => {
                    leaf.units = (!delete).then_some(sym)
                }
                SnodePayload::LeafList(leaflist) => {
                    leaflist.units = (!delete).then_some(sym)
                }
                _ => (),
            }
        }
        if let Some(min) = fields.min_elements {
            match &mut self.ctx.snodes[target].payload {
                SnodePayload::List(list) => list.min = min,
                SnodePayload::LeafList(leaflist) => leaflist.min = min,
                _ => (),
            }
        }
        if let Some(max) = fields.max_elements {
            match &mut self.ctx.snodes[target].payload {
                SnodePayload::List(list) => list.max = max,
                SnodePayload::LeafList(leaflist) => leaflist.max = max,
                _ => (),
            }
        }
        if let Some(type_decl) = &fields.type_ {
            let ty = self.compile_type(env, type_decl, None, None, None)?;
            let ty = self.clone_if_leafref(ty);
            match &mut self.ctx.snodes[target].payload {
                SnodePayload::Leaf(leaf) => {
                    leaf.ty = ty;
                    leaf.default = None;
                }
                SnodePayload::LeafList(leaflist) => {
                    leaflist.ty = ty;
                    leaflist.defaults.clear();
                }
                _ => (),
            }
        }
        if !fields.defaults.is_empty() {
            if delete {
                match &mut self.ctx.snodes[target].payload {
                    SnodePayload::Leaf(leaf) => leaf.default = None,
                    SnodePayload::LeafList(leaflist) => {
                        leaflist.defaults.clear()
                    }
                    _ => (),
                }
            } else {
                let ty = self.ctx.snodes[target].leaf_type();
                if let Some(ty) = ty {
                    let stored: Result<Vec<StoredValue>> = fields
                        .defaults
                        .iter()
                        .map(|d| self.store_schema_value(env, ty, d))
                        .collect();
                    let mut stored = stored?;
                    match &mut self.ctx.snodes[target].payload {
                        SnodePayload::Leaf(leaf) => {
                            leaf.default = stored.pop()
                        }
                        SnodePayload::LeafList(leaflist) => {
                            leaflist.defaults = stored
                        }
                        _ => (),
                    }
                }
            }
        }
        if !fields.musts.is_empty() {
            if delete {
                let exprs: Vec<&str> = fields
                    .musts
                    .iter()
                    .map(|must| must.expr.as_str())
                    .collect();
                self.ctx.snodes[target]
                    .musts
                    .retain(|must| !exprs.contains(&must.expr.text()));
            } else {
                let compiled = fields
                    .musts
                    .iter()
                    .map(|must| self.compile_must(env, must))
                    .collect::<Result<Vec<_>>>()?;
                self.ctx.snodes[target].musts.extend(compiled);
            }
        }
        Ok(())
    }

    // ===== pass 8: leafref binding =====

    fn bind_leafrefs(&mut self) -> Result<()> {
        let new_snodes: Vec<SnodeId> = (self.snap.snodes
            ..self.ctx.snodes.len())
            .map(crate::arena::Id::new)
            .collect();
        for snode in new_snodes {
            let Some(ty) = self.ctx.snodes[snode].leaf_type() else {
                continue;
            };
            self.bind_leafref_type(snode, ty)?;
        }

        // Reject leafref chains that loop back on themselves.
        for index in self.snap.snodes..self.ctx.snodes.len() {
            let snode: SnodeId = crate::arena::Id::new(index);
            let Some(ty) = self.ctx.snodes[snode].leaf_type() else {
                continue;
            };
            let mut visited = HashSet::new();
            let mut current = snode;
            visited.insert(current);
            while let Some(target) = self.leafref_target_of(current, ty) {
                if !visited.insert(target) {
                    return Err(Error::new(
                        ErrorKind::CircularDependency,
                        format!(
                            "circular leafref chain through \"{}\"",
                            self.ctx.resolve(self.ctx.snodes[snode].name)
                        ),
                    ));
                }
                current = target;
                if self.ctx.snodes[current].leaf_type().is_none() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn leafref_target_of(
        &self,
        snode: SnodeId,
        _ty: TypeId,
    ) -> Option<SnodeId> {
        let ty = self.ctx.snodes[snode].leaf_type()?;
        match &self.ctx.types[ty].spec {
            TypeSpec::Leafref { target, .. } => *target,
            _ => None,
        }
    }

    fn bind_leafref_type(&mut self, snode: SnodeId, ty: TypeId) -> Result<()> {
        let spec = self.ctx.types[ty].spec.clone();
        match spec {
            TypeSpec::Leafref {
                path, path_module, ..
            } => {
                let targets = eval::find_schema_nodes(
                    self.ctx,
                    &path,
                    Some(snode),
                    path_module,
                    XPathOptions::SNODE,
                )?;
                let target = targets
                    .into_iter()
                    .find(|id| {
                        matches!(
                            self.ctx.snodes[*id].kind,
                            SchemaNodeKind::Leaf | SchemaNodeKind::LeafList
                        )
                    })
                    .ok_or_else(|| {
                        Error::new_path(
                            ErrorKind::UnresolvedReference,
                            format!(
                                "leafref path \"{}\" does not resolve to a leaf",
                                path.text()
                            ),
                            self.snode_path(snode),
                        )
                    })?;
                self.check_status_reference(
                    self.ctx.snodes[snode].status,
                    self.ctx.snodes[target].status,
                    &format!("leafref \"{}\"", self.snode_path(snode)),
                )?;
                let real_type = self.ctx.snodes[target].leaf_type();
                if let TypeSpec::Leafref {
                    target: slot,
                    real_type: real_slot,
                    ..
                } = &mut self.ctx.types[ty].spec
                {
                    *slot = Some(target);
                    *real_slot = real_type;
                }
                Ok(())
            }
            TypeSpec::Union { members } => {
                for member in members {
                    self.bind_leafref_type(snode, member)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ===== passes 9-10: static analysis and status gating =====

    fn snode_path(&self, snode: SnodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(snode);
        while let Some(id) = current {
            let node = &self.ctx.snodes[id];
            segments.push(format!(
                "{}:{}",
                self.ctx.resolve(self.ctx.modules[node.module].name),
                self.ctx.resolve(node.name)
            ));
            current = node.parent;
        }
        let mut path = String::new();
        for segment in segments.iter().rev() {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    fn check_status_reference(
        &self,
        host: Status,
        target: Status,
        what: &str,
    ) -> Result<()> {
        if target <= host {
            return Ok(());
        }
        let msg = format!(
            "{} references a {} definition",
            what,
            match target {
                Status::Deprecated => "deprecated",
                _ => "obsolete",
            }
        );
        if self
            .ctx
            .flags
            .contains(crate::context::ContextFlags::STATUS_WARN_ONLY)
        {
            self.ctx.warn(&msg, None);
            Ok(())
        } else {
            Err(Error::new(ErrorKind::StatusDowngrade, msg))
        }
    }

    /// Atomize every `when`/`must` of the freshly compiled nodes,
    /// checking referenced-node status and deriving the
    /// config/state dependency flags used to schedule re-validation.
    fn analyze_xpath(&mut self) -> Result<()> {
        for index in self.snap.snodes..self.ctx.snodes.len() {
            self.ctx.check_cancelled()?;
            let snode: SnodeId = crate::arena::Id::new(index);
            let host_status = self.ctx.snodes[snode].status;
            let parent = self.nearest_data_ancestor(snode);

            let specs: Vec<(XPathExpr, ModuleId, bool, bool)> = {
                let node = &self.ctx.snodes[snode];
                node.whens
                    .iter()
                    .map(|when| {
                        (
                            when.expr.clone(),
                            when.module,
                            when.ctx_is_parent,
                            true,
                        )
                    })
                    .chain(node.musts.iter().map(|must| {
                        (must.expr.clone(), must.module, false, false)
                    }))
                    .collect()
            };
            if specs.is_empty() {
                continue;
            }

            let mut dep_flags = SchemaFlags::empty();
            for (expr, module, ctx_is_parent, is_when) in specs {
                let ctx_snode = if ctx_is_parent { parent } else { Some(snode) };
                let purpose = if is_when {
                    XPathOptions::SNODE_WHEN
                } else {
                    XPathOptions::SNODE_MUST
                };
                let opts = XPathOptions::SNODE
                    | purpose
                    | if self.ctx.snodes[snode]
                        .flags
                        .contains(SchemaFlags::IS_OUTPUT)
                    {
                        XPathOptions::SNODE_OUTPUT
                    } else {
                        XPathOptions::empty()
                    };
                let deps = eval::atomize(
                    self.ctx, &expr, ctx_snode, module, opts,
                )
                .map_err(|err| err.with_path(self.snode_path(snode)))?;
                for dep in deps {
                    // A reference to the host node itself is not an
                    // external dependency.
                    if dep == snode {
                        continue;
                    }
                    let dep_node = &self.ctx.snodes[dep];
                    self.check_status_reference(
                        host_status,
                        dep_node.status,
                        &format!(
                            "expression \"{}\" on \"{}\"",
                            expr.text(),
                            self.snode_path(snode)
                        ),
                    )?;
                    if dep_node.flags.contains(SchemaFlags::CONFIG_W) {
                        dep_flags |= SchemaFlags::XPATH_DEP_CONFIG;
                    }
                    if dep_node.flags.contains(SchemaFlags::CONFIG_R) {
                        dep_flags |= SchemaFlags::XPATH_DEP_STATE;
                    }
                }
            }
            self.ctx.snodes[snode].flags |= dep_flags;
        }
        Ok(())
    }

    fn nearest_data_ancestor(&self, snode: SnodeId) -> Option<SnodeId> {
        let mut parent = self.ctx.snodes[snode].parent;
        while let Some(id) = parent {
            if self.ctx.snodes[id].is_data_node() {
                return Some(id);
            }
            parent = self.ctx.snodes[id].parent;
        }
        None
    }
}

// ===== refines =====

fn apply_refine(
    children: &mut [DataDecl],
    refine: &crate::builder::RefineDecl,
) -> Result<()> {
    let mut segments = refine.target.split('/').filter(|s| !s.is_empty());
    let first = segments.next().ok_or_else(|| {
        Error::new(ErrorKind::Syntax, "empty refine target")
    })?;
    let mut current = children
        .iter_mut()
        .find(|child| child.name == first)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::UnresolvedReference,
                format!("refine target \"{}\" not found", refine.target),
            )
        })?;
    for segment in segments {
        current = current
            .children
            .iter_mut()
            .find(|child| child.name == segment)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnresolvedReference,
                    format!(
                        "refine target \"{}\" not found",
                        refine.target
                    ),
                )
            })?;
    }
    if let Some(config) = refine.config {
        current.config = Some(config);
    }
    if let Some(mandatory) = refine.mandatory {
        current.mandatory = Some(mandatory);
    }
    if refine.presence {
        current.presence = true;
    }
    if let Some(default) = &refine.default {
        current.default = Some(default.clone());
    }
    if !refine.defaults.is_empty() {
        current.defaults = refine.defaults.clone();
    }
    if let Some(min) = refine.min_elements {
        current.min_elements = Some(min);
    }
    if let Some(max) = refine.max_elements {
        current.max_elements = Some(max);
    }
    if let Some(description) = &refine.description {
        current.description = Some(description.clone());
    }
    current.musts.extend(refine.musts.iter().cloned());
    if let Some(when) = &refine.when {
        current.when = Some(when.clone());
    }
    Ok(())
}

// ===== pass 1: module graph =====

/// Check the import graph of the batch for cycles (depth-first with a
/// grey/black marker), check submodule include graphs, and return the
/// batch indices in dependency order.
fn module_graph_order(
    ctx: &Context,
    decls: &[ModuleDecl],
) -> Result<Vec<usize>> {
    let by_name: HashMap<&str, usize> = decls
        .iter()
        .enumerate()
        .map(|(index, decl)| (decl.name.as_str(), index))
        .collect();

    // Submodule include graphs first.
    for decl in decls {
        let includes: HashMap<&str, &[String]> = decl
            .includes
            .iter()
            .map(|sub| (sub.name.as_str(), sub.includes.as_slice()))
            .collect();
        let mut marks: HashMap<&str, u8> = HashMap::new();
        for sub in &decl.includes {
            include_dfs(sub.name.as_str(), &includes, &mut marks).map_err(
                |cycle| {
                    Error::new(
                        ErrorKind::CircularDependency,
                        format!(
                            "include cycle through submodule \"{}\" of \"{}\"",
                            cycle, decl.name
                        ),
                    )
                },
            )?;
        }
    }

    // Import graph: white (absent), grey (1), black (2).
    let mut marks: Vec<u8> = vec![0; decls.len()];
    let mut order = Vec::new();
    fn visit(
        index: usize,
        decls: &[ModuleDecl],
        by_name: &HashMap<&str, usize>,
        _ctx: &Context,
        marks: &mut Vec<u8>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[index] {
            2 => return Ok(()),
            1 => {
                return Err(Error::new(
                    ErrorKind::CircularDependency,
                    format!(
                        "import cycle through module \"{}\"",
                        decls[index].name
                    ),
                ));
            }
            _ => (),
        }
        marks[index] = 1;
        for import in &decls[index].imports {
            if let Some(dep) = by_name.get(import.module.as_str()) {
                visit(*dep, decls, by_name, _ctx, marks, order)?;
            }
            // Imports of already-loaded modules are resolved later.
        }
        marks[index] = 2;
        order.push(index);
        Ok(())
    }
    for index in 0..decls.len() {
        visit(index, decls, &by_name, ctx, &mut marks, &mut order)?;
    }
    Ok(order)
}

fn include_dfs<'a>(
    name: &'a str,
    includes: &HashMap<&'a str, &'a [String]>,
    marks: &mut HashMap<&'a str, u8>,
) -> std::result::Result<(), String> {
    match marks.get(name) {
        Some(2) => return Ok(()),
        Some(1) => return Err(name.to_string()),
        _ => (),
    }
    marks.insert(name, 1);
    if let Some(subs) = includes.get(name) {
        for sub in subs.iter() {
            include_dfs(sub.as_str(), includes, marks)?;
        }
    }
    marks.insert(name, 2);
    Ok(())
}

// ===== feature expressions =====

fn parse_feature_expr(input: &str) -> Result<FeatureExpr> {
    let tokens: Vec<&str> = tokenize_feature_expr(input);
    let mut pos = 0;
    let expr = parse_fe_or(&tokens, &mut pos).ok_or_else(|| {
        Error::new(
            ErrorKind::Syntax,
            format!("invalid if-feature expression \"{}\"", input),
        )
    })?;
    if pos != tokens.len() {
        return Err(Error::new(
            ErrorKind::Syntax,
            format!("invalid if-feature expression \"{}\"", input),
        ));
    }
    Ok(expr)
}

fn tokenize_feature_expr(input: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('(') {
            tokens.push("(");
            rest = stripped.trim_start();
        } else if let Some(stripped) = rest.strip_prefix(')') {
            tokens.push(")");
            rest = stripped.trim_start();
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
                .unwrap_or(rest.len());
            tokens.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }
    }
    tokens
}

fn parse_fe_or(tokens: &[&str], pos: &mut usize) -> Option<FeatureExpr> {
    let mut lhs = parse_fe_and(tokens, pos)?;
    while tokens.get(*pos) == Some(&"or") {
        *pos += 1;
        let rhs = parse_fe_and(tokens, pos)?;
        lhs = FeatureExpr::Or(Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn parse_fe_and(tokens: &[&str], pos: &mut usize) -> Option<FeatureExpr> {
    let mut lhs = parse_fe_not(tokens, pos)?;
    while tokens.get(*pos) == Some(&"and") {
        *pos += 1;
        let rhs = parse_fe_not(tokens, pos)?;
        lhs = FeatureExpr::And(Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn parse_fe_not(tokens: &[&str], pos: &mut usize) -> Option<FeatureExpr> {
    if tokens.get(*pos) == Some(&"not") {
        *pos += 1;
        let inner = parse_fe_not(tokens, pos)?;
        return Some(FeatureExpr::Not(Box::new(inner)));
    }
    match tokens.get(*pos) {
        Some(&"(") => {
            *pos += 1;
            let inner = parse_fe_or(tokens, pos)?;
            if tokens.get(*pos) != Some(&")") {
                return None;
            }
            *pos += 1;
            Some(inner)
        }
        Some(name)
            if !matches!(*name, "and" | "or" | "not" | ")") =>
        {
            *pos += 1;
            Some(FeatureExpr::Ref(name.to_string()))
        }
        _ => None,
    }
}

// ===== range parsing =====

fn int_bounds(width: u8) -> (i64, i64) {
    match width {
        8 => (i8::MIN as i64, i8::MAX as i64),
        16 => (i16::MIN as i64, i16::MAX as i64),
        32 => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

fn uint_bounds(width: u8) -> (u64, u64) {
    match width {
        8 => (0, u8::MAX as u64),
        16 => (0, u16::MAX as u64),
        32 => (0, u32::MAX as u64),
        _ => (0, u64::MAX),
    }
}

fn split_range_parts(spec: &str) -> Vec<(String, String)> {
    spec.split('|')
        .map(|part| {
            let part = part.trim();
            match part.split_once("..") {
                Some((lo, hi)) => (lo.trim().to_string(), hi.trim().to_string()),
                None => (part.to_string(), part.to_string()),
            }
        })
        .collect()
}

fn parse_int_ranges(spec: &str, bounds: (i64, i64)) -> Result<Ranges<i64>> {
    let mut out: SmallVec<[(i64, i64); 1]> = SmallVec::new();
    for (lo, hi) in split_range_parts(spec) {
        let lo = match lo.as_str() {
            "min" => bounds.0,
            other => parse_int_lexical(other)? as i64,
        };
        let hi = match hi.as_str() {
            "max" => bounds.1,
            other => parse_int_lexical(other)? as i64,
        };
        if lo > hi {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("invalid range \"{}\"", spec),
            ));
        }
        out.push((lo, hi));
    }
    Ok(Ranges(out))
}

fn parse_uint_ranges(spec: &str, bounds: (u64, u64)) -> Result<Ranges<u64>> {
    let mut out: SmallVec<[(u64, u64); 1]> = SmallVec::new();
    for (lo, hi) in split_range_parts(spec) {
        let lo = match lo.as_str() {
            "min" => bounds.0,
            other => parse_int_lexical(other)? as u64,
        };
        let hi = match hi.as_str() {
            "max" => bounds.1,
            other => parse_int_lexical(other)? as u64,
        };
        if lo > hi {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("invalid range \"{}\"", spec),
            ));
        }
        out.push((lo, hi));
    }
    Ok(Ranges(out))
}

fn parse_dec_ranges(spec: &str, fraction_digits: u8) -> Result<Ranges<i64>> {
    let mut out: SmallVec<[(i64, i64); 1]> = SmallVec::new();
    for (lo, hi) in split_range_parts(spec) {
        let lo = match lo.as_str() {
            "min" => i64::MIN,
            other => parse_decimal64(other, fraction_digits)?,
        };
        let hi = match hi.as_str() {
            "max" => i64::MAX,
            other => parse_decimal64(other, fraction_digits)?,
        };
        if lo > hi {
            return Err(Error::new(
                ErrorKind::Syntax,
                format!("invalid range \"{}\"", spec),
            ));
        }
        out.push((lo, hi));
    }
    Ok(Ranges(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_exprs() {
        let expr = parse_feature_expr("a and not (b or c)").unwrap();
        match expr {
            FeatureExpr::And(_, _) => (),
            other => panic!("unexpected expression: {:?}", other),
        }
        assert!(parse_feature_expr("and").is_err());
        assert!(parse_feature_expr("a or").is_err());
    }

    #[test]
    fn range_specs() {
        let ranges = parse_int_ranges("1..10 | 20", (-128, 127)).unwrap();
        assert!(ranges.contains(5));
        assert!(ranges.contains(20));
        assert!(!ranges.contains(15));
        let ranges = parse_int_ranges("min..0", (-128, 127)).unwrap();
        assert!(ranges.contains(-128));
        assert!(!ranges.contains(1));
        assert!(parse_int_ranges("10..1", (-128, 127)).is_err());
    }
}
