//
// Copyright (c) The yangcore Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Pre-resolution module skeletons.
//!
//! External schema parsers drive the engine through these declaration
//! types: one `ModuleDecl` per parsed module, carrying unresolved names
//! (typedef references, grouping names, augment targets) as plain
//! strings. [`Context::load_module`] hands the skeletons to the resolver,
//! which either produces the immutable compiled schema or rejects the
//! batch; unresolved references can never reach the evaluator.
//!
//! [`Context::load_module`]: crate::context::Context::load_module

use crate::schema::Status;

/// Declared (pre-resolution) module.
#[derive(Clone, Debug)]
pub struct ModuleDecl {
    pub name: String,
    pub namespace: String,
    pub prefix: String,
    /// Revision dates, any order; the resolver sorts them newest first.
    pub revisions: Vec<String>,
    pub imports: Vec<ImportDecl>,
    pub includes: Vec<SubmoduleDecl>,
    pub organization: Option<String>,
    pub contact: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub typedefs: Vec<TypedefDecl>,
    pub identities: Vec<IdentityDecl>,
    pub features: Vec<FeatureDecl>,
    pub extensions: Vec<ExtensionDecl>,
    pub groupings: Vec<GroupingDecl>,
    pub augments: Vec<AugmentDecl>,
    pub deviations: Vec<DeviationDecl>,
    /// Top-level data definitions, RPCs and notifications.
    pub data: Vec<DataDecl>,
}

/// Declared import.
#[derive(Clone, Debug)]
pub struct ImportDecl {
    pub module: String,
    pub prefix: String,
    /// Exact revision to import; the newest one otherwise.
    pub revision: Option<String>,
}

/// Declared submodule inclusion. Submodule bodies are expected to be
/// merged into the parent declaration by the parser; the engine only
/// checks the include graph.
#[derive(Clone, Debug)]
pub struct SubmoduleDecl {
    pub name: String,
    pub includes: Vec<String>,
}

/// Declared typedef.
#[derive(Clone, Debug)]
pub struct TypedefDecl {
    pub name: String,
    pub type_: TypeDecl,
    pub default: Option<String>,
    pub units: Option<String>,
    pub status: Status,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// Declared identity.
#[derive(Clone, Debug)]
pub struct IdentityDecl {
    pub name: String,
    /// Base identities, `[prefix:]name`. Multiple bases are allowed.
    pub bases: Vec<String>,
    pub status: Status,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub if_features: Vec<String>,
}

/// Declared feature.
#[derive(Clone, Debug)]
pub struct FeatureDecl {
    pub name: String,
    pub if_features: Vec<String>,
    pub status: Status,
    pub description: Option<String>,
}

/// Declared extension.
#[derive(Clone, Debug)]
pub struct ExtensionDecl {
    pub name: String,
    pub argument: Option<String>,
    pub description: Option<String>,
}

/// Declared grouping (a reusable subtree template).
#[derive(Clone, Debug)]
pub struct GroupingDecl {
    pub name: String,
    pub children: Vec<DataDecl>,
}

/// Declared augment.
#[derive(Clone, Debug)]
pub struct AugmentDecl {
    /// Absolute schema path of the target node (`/pfx:a/pfx:b`), or a
    /// descendant path when nested inside a `uses`.
    pub target: String,
    pub when: Option<WhenDecl>,
    pub if_features: Vec<String>,
    pub children: Vec<DataDecl>,
}

/// Declared deviation.
#[derive(Clone, Debug)]
pub struct DeviationDecl {
    pub target: String,
    pub deviates: Vec<DeviateDecl>,
}

/// One deviate statement of a deviation.
#[derive(Clone, Debug)]
pub enum DeviateDecl {
    NotSupported,
    Add(DeviateFields),
    Delete(DeviateFields),
    Replace(DeviateFields),
}

/// Properties affected by an add/delete/replace deviate.
#[derive(Clone, Debug, Default)]
pub struct DeviateFields {
    pub config: Option<bool>,
    pub mandatory: Option<bool>,
    pub min_elements: Option<u32>,
    pub max_elements: Option<u32>,
    pub units: Option<String>,
    pub defaults: Vec<String>,
    pub musts: Vec<MustDecl>,
    pub uniques: Vec<Vec<String>>,
    pub type_: Option<TypeDecl>,
}

/// Declared refine, applied to a descendant of an expanded grouping.
#[derive(Clone, Debug)]
pub struct RefineDecl {
    /// Descendant schema path relative to the `uses`.
    pub target: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub config: Option<bool>,
    pub mandatory: Option<bool>,
    pub presence: bool,
    pub default: Option<String>,
    pub defaults: Vec<String>,
    pub min_elements: Option<u32>,
    pub max_elements: Option<u32>,
    pub musts: Vec<MustDecl>,
    pub when: Option<WhenDecl>,
}

/// Declared must restriction.
#[derive(Clone, Debug)]
pub struct MustDecl {
    pub expr: String,
    pub error_message: Option<String>,
    pub error_app_tag: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// Declared when condition.
#[derive(Clone, Debug)]
pub struct WhenDecl {
    pub expr: String,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// Declared extension instance attached to a node.
#[derive(Clone, Debug)]
pub struct ExtInstanceDecl {
    /// Name of the module defining the extension.
    pub module: String,
    pub name: String,
    pub revision: Option<String>,
    pub argument: Option<String>,
}

/// Data definition statement kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataDeclKind {
    Container,
    List,
    Leaf,
    LeafList,
    Choice,
    Case,
    AnyData,
    AnyXml,
    Rpc,
    Action,
    Notification,
    Uses,
}

/// Declared data-def statement.
#[derive(Clone, Debug)]
pub struct DataDecl {
    pub kind: DataDeclKind,
    pub name: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub status: Status,
    pub config: Option<bool>,
    pub mandatory: Option<bool>,
    pub presence: bool,
    pub when: Option<WhenDecl>,
    pub musts: Vec<MustDecl>,
    pub if_features: Vec<String>,
    pub type_: Option<TypeDecl>,
    pub default: Option<String>,
    pub defaults: Vec<String>,
    pub units: Option<String>,
    pub keys: Vec<String>,
    pub uniques: Vec<Vec<String>>,
    pub min_elements: Option<u32>,
    pub max_elements: Option<u32>,
    pub ordered_by_user: bool,
    pub default_case: Option<String>,
    /// Referenced grouping of a `uses`, `[prefix:]name`.
    pub grouping: Option<String>,
    pub refines: Vec<RefineDecl>,
    pub uses_augments: Vec<AugmentDecl>,
    pub children: Vec<DataDecl>,
    pub input: Vec<DataDecl>,
    pub output: Vec<DataDecl>,
    pub exts: Vec<ExtInstanceDecl>,
}

/// Declared type reference or restriction.
#[derive(Clone, Debug)]
pub struct TypeDecl {
    /// Builtin type name or `[prefix:]typedef`.
    pub name: String,
    pub range: Option<String>,
    pub length: Option<String>,
    pub patterns: Vec<PatternDecl>,
    pub fraction_digits: Option<u8>,
    pub enums: Vec<EnumDecl>,
    pub bits: Vec<BitDecl>,
    pub path: Option<String>,
    pub require_instance: Option<bool>,
    pub bases: Vec<String>,
    pub members: Vec<TypeDecl>,
}

/// Declared pattern restriction.
#[derive(Clone, Debug)]
pub struct PatternDecl {
    pub pattern: String,
    pub invert_match: bool,
}

/// Declared enumeration member.
#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub name: String,
    pub value: Option<i32>,
    pub status: Status,
}

/// Declared bit.
#[derive(Clone, Debug)]
pub struct BitDecl {
    pub name: String,
    pub position: Option<u32>,
}

// ===== impl ModuleDecl =====

impl ModuleDecl {
    pub fn new(name: &str, namespace: &str, prefix: &str) -> ModuleDecl {
        ModuleDecl {
            name: name.to_string(),
            namespace: namespace.to_string(),
            prefix: prefix.to_string(),
            revisions: Vec::new(),
            imports: Vec::new(),
            includes: Vec::new(),
            organization: None,
            contact: None,
            description: None,
            reference: None,
            typedefs: Vec::new(),
            identities: Vec::new(),
            features: Vec::new(),
            extensions: Vec::new(),
            groupings: Vec::new(),
            augments: Vec::new(),
            deviations: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn revision(mut self, revision: &str) -> ModuleDecl {
        self.revisions.push(revision.to_string());
        self
    }

    pub fn import(
        mut self,
        module: &str,
        prefix: &str,
        revision: Option<&str>,
    ) -> ModuleDecl {
        self.imports.push(ImportDecl {
            module: module.to_string(),
            prefix: prefix.to_string(),
            revision: revision.map(str::to_string),
        });
        self
    }

    pub fn include(mut self, submodule: SubmoduleDecl) -> ModuleDecl {
        self.includes.push(submodule);
        self
    }

    pub fn organization(mut self, organization: &str) -> ModuleDecl {
        self.organization = Some(organization.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> ModuleDecl {
        self.description = Some(description.to_string());
        self
    }

    pub fn typedef(mut self, typedef: TypedefDecl) -> ModuleDecl {
        self.typedefs.push(typedef);
        self
    }

    pub fn identity(mut self, identity: IdentityDecl) -> ModuleDecl {
        self.identities.push(identity);
        self
    }

    pub fn feature(mut self, feature: FeatureDecl) -> ModuleDecl {
        self.features.push(feature);
        self
    }

    pub fn extension(mut self, extension: ExtensionDecl) -> ModuleDecl {
        self.extensions.push(extension);
        self
    }

    pub fn grouping(mut self, grouping: GroupingDecl) -> ModuleDecl {
        self.groupings.push(grouping);
        self
    }

    pub fn augment(mut self, augment: AugmentDecl) -> ModuleDecl {
        self.augments.push(augment);
        self
    }

    pub fn deviation(mut self, deviation: DeviationDecl) -> ModuleDecl {
        self.deviations.push(deviation);
        self
    }

    pub fn node(mut self, node: DataDecl) -> ModuleDecl {
        self.data.push(node);
        self
    }
}

// ===== impl SubmoduleDecl =====

impl SubmoduleDecl {
    pub fn new(name: &str) -> SubmoduleDecl {
        SubmoduleDecl {
            name: name.to_string(),
            includes: Vec::new(),
        }
    }

    pub fn include(mut self, submodule: &str) -> SubmoduleDecl {
        self.includes.push(submodule.to_string());
        self
    }
}

// ===== impl TypedefDecl =====

impl TypedefDecl {
    pub fn new(name: &str, type_: TypeDecl) -> TypedefDecl {
        TypedefDecl {
            name: name.to_string(),
            type_,
            default: None,
            units: None,
            status: Status::Current,
            description: None,
            reference: None,
        }
    }

    pub fn default(mut self, default: &str) -> TypedefDecl {
        self.default = Some(default.to_string());
        self
    }

    pub fn units(mut self, units: &str) -> TypedefDecl {
        self.units = Some(units.to_string());
        self
    }

    pub fn status(mut self, status: Status) -> TypedefDecl {
        self.status = status;
        self
    }
}

// ===== impl IdentityDecl =====

impl IdentityDecl {
    pub fn new(name: &str) -> IdentityDecl {
        IdentityDecl {
            name: name.to_string(),
            bases: Vec::new(),
            status: Status::Current,
            description: None,
            reference: None,
            if_features: Vec::new(),
        }
    }

    pub fn base(mut self, base: &str) -> IdentityDecl {
        self.bases.push(base.to_string());
        self
    }

    pub fn status(mut self, status: Status) -> IdentityDecl {
        self.status = status;
        self
    }
}

// ===== impl FeatureDecl =====

impl FeatureDecl {
    pub fn new(name: &str) -> FeatureDecl {
        FeatureDecl {
            name: name.to_string(),
            if_features: Vec::new(),
            status: Status::Current,
            description: None,
        }
    }

    pub fn if_feature(mut self, expr: &str) -> FeatureDecl {
        self.if_features.push(expr.to_string());
        self
    }
}

// ===== impl ExtensionDecl =====

impl ExtensionDecl {
    pub fn new(name: &str) -> ExtensionDecl {
        ExtensionDecl {
            name: name.to_string(),
            argument: None,
            description: None,
        }
    }

    pub fn argument(mut self, argument: &str) -> ExtensionDecl {
        self.argument = Some(argument.to_string());
        self
    }
}

// ===== impl GroupingDecl =====

impl GroupingDecl {
    pub fn new(name: &str) -> GroupingDecl {
        GroupingDecl {
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    pub fn node(mut self, node: DataDecl) -> GroupingDecl {
        self.children.push(node);
        self
    }
}

// ===== impl AugmentDecl =====

impl AugmentDecl {
    pub fn new(target: &str) -> AugmentDecl {
        AugmentDecl {
            target: target.to_string(),
            when: None,
            if_features: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn when(mut self, expr: &str) -> AugmentDecl {
        self.when = Some(WhenDecl::new(expr));
        self
    }

    pub fn if_feature(mut self, expr: &str) -> AugmentDecl {
        self.if_features.push(expr.to_string());
        self
    }

    pub fn node(mut self, node: DataDecl) -> AugmentDecl {
        self.children.push(node);
        self
    }
}

// ===== impl DeviationDecl =====

impl DeviationDecl {
    pub fn new(target: &str) -> DeviationDecl {
        DeviationDecl {
            target: target.to_string(),
            deviates: Vec::new(),
        }
    }

    pub fn deviate(mut self, deviate: DeviateDecl) -> DeviationDecl {
        self.deviates.push(deviate);
        self
    }
}

// ===== impl RefineDecl =====

impl RefineDecl {
    pub fn new(target: &str) -> RefineDecl {
        RefineDecl {
            target: target.to_string(),
            description: None,
            reference: None,
            config: None,
            mandatory: None,
            presence: false,
            default: None,
            defaults: Vec::new(),
            min_elements: None,
            max_elements: None,
            musts: Vec::new(),
            when: None,
        }
    }

    pub fn default(mut self, default: &str) -> RefineDecl {
        self.default = Some(default.to_string());
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> RefineDecl {
        self.mandatory = Some(mandatory);
        self
    }

    pub fn config(mut self, config: bool) -> RefineDecl {
        self.config = Some(config);
        self
    }

    pub fn must(mut self, expr: &str) -> RefineDecl {
        self.musts.push(MustDecl::new(expr));
        self
    }
}

// ===== impl MustDecl =====

impl MustDecl {
    pub fn new(expr: &str) -> MustDecl {
        MustDecl {
            expr: expr.to_string(),
            error_message: None,
            error_app_tag: None,
            description: None,
            reference: None,
        }
    }

    pub fn error_message(mut self, msg: &str) -> MustDecl {
        self.error_message = Some(msg.to_string());
        self
    }

    pub fn error_app_tag(mut self, tag: &str) -> MustDecl {
        self.error_app_tag = Some(tag.to_string());
        self
    }
}

// ===== impl WhenDecl =====

impl WhenDecl {
    pub fn new(expr: &str) -> WhenDecl {
        WhenDecl {
            expr: expr.to_string(),
            description: None,
            reference: None,
        }
    }
}

// ===== impl DataDecl =====

impl DataDecl {
    fn with_kind(kind: DataDeclKind, name: &str) -> DataDecl {
        DataDecl {
            kind,
            name: name.to_string(),
            description: None,
            reference: None,
            status: Status::Current,
            config: None,
            mandatory: None,
            presence: false,
            when: None,
            musts: Vec::new(),
            if_features: Vec::new(),
            type_: None,
            default: None,
            defaults: Vec::new(),
            units: None,
            keys: Vec::new(),
            uniques: Vec::new(),
            min_elements: None,
            max_elements: None,
            ordered_by_user: false,
            default_case: None,
            grouping: None,
            refines: Vec::new(),
            uses_augments: Vec::new(),
            children: Vec::new(),
            input: Vec::new(),
            output: Vec::new(),
            exts: Vec::new(),
        }
    }

    pub fn container(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::Container, name)
    }

    pub fn list(name: &str, keys: &[&str]) -> DataDecl {
        let mut decl = DataDecl::with_kind(DataDeclKind::List, name);
        decl.keys = keys.iter().map(|key| key.to_string()).collect();
        decl
    }

    pub fn leaf(name: &str, type_: TypeDecl) -> DataDecl {
        let mut decl = DataDecl::with_kind(DataDeclKind::Leaf, name);
        decl.type_ = Some(type_);
        decl
    }

    pub fn leaf_list(name: &str, type_: TypeDecl) -> DataDecl {
        let mut decl = DataDecl::with_kind(DataDeclKind::LeafList, name);
        decl.type_ = Some(type_);
        decl
    }

    pub fn choice(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::Choice, name)
    }

    pub fn case(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::Case, name)
    }

    pub fn anydata(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::AnyData, name)
    }

    pub fn anyxml(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::AnyXml, name)
    }

    pub fn rpc(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::Rpc, name)
    }

    pub fn action(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::Action, name)
    }

    pub fn notification(name: &str) -> DataDecl {
        DataDecl::with_kind(DataDeclKind::Notification, name)
    }

    pub fn uses(grouping: &str) -> DataDecl {
        let mut decl = DataDecl::with_kind(DataDeclKind::Uses, grouping);
        decl.grouping = Some(grouping.to_string());
        decl
    }

    pub fn child(mut self, child: DataDecl) -> DataDecl {
        self.children.push(child);
        self
    }

    pub fn input_node(mut self, child: DataDecl) -> DataDecl {
        self.input.push(child);
        self
    }

    pub fn output_node(mut self, child: DataDecl) -> DataDecl {
        self.output.push(child);
        self
    }

    pub fn config(mut self, config: bool) -> DataDecl {
        self.config = Some(config);
        self
    }

    pub fn mandatory(mut self, mandatory: bool) -> DataDecl {
        self.mandatory = Some(mandatory);
        self
    }

    pub fn presence(mut self) -> DataDecl {
        self.presence = true;
        self
    }

    pub fn status(mut self, status: Status) -> DataDecl {
        self.status = status;
        self
    }

    pub fn when(mut self, expr: &str) -> DataDecl {
        self.when = Some(WhenDecl::new(expr));
        self
    }

    pub fn must(mut self, must: MustDecl) -> DataDecl {
        self.musts.push(must);
        self
    }

    pub fn if_feature(mut self, expr: &str) -> DataDecl {
        self.if_features.push(expr.to_string());
        self
    }

    pub fn default(mut self, default: &str) -> DataDecl {
        match self.kind {
            DataDeclKind::LeafList => {
                self.defaults.push(default.to_string())
            }
            _ => self.default = Some(default.to_string()),
        }
        self
    }

    pub fn units(mut self, units: &str) -> DataDecl {
        self.units = Some(units.to_string());
        self
    }

    pub fn unique(mut self, leaves: &[&str]) -> DataDecl {
        self.uniques
            .push(leaves.iter().map(|leaf| leaf.to_string()).collect());
        self
    }

    pub fn min_elements(mut self, min: u32) -> DataDecl {
        self.min_elements = Some(min);
        self
    }

    pub fn max_elements(mut self, max: u32) -> DataDecl {
        self.max_elements = Some(max);
        self
    }

    pub fn ordered_by_user(mut self) -> DataDecl {
        self.ordered_by_user = true;
        self
    }

    pub fn default_case(mut self, case: &str) -> DataDecl {
        self.default_case = Some(case.to_string());
        self
    }

    pub fn refine(mut self, refine: RefineDecl) -> DataDecl {
        self.refines.push(refine);
        self
    }

    pub fn augment(mut self, augment: AugmentDecl) -> DataDecl {
        self.uses_augments.push(augment);
        self
    }

    pub fn ext(mut self, ext: ExtInstanceDecl) -> DataDecl {
        self.exts.push(ext);
        self
    }
}

// ===== impl TypeDecl =====

impl TypeDecl {
    pub fn new(name: &str) -> TypeDecl {
        TypeDecl {
            name: name.to_string(),
            range: None,
            length: None,
            patterns: Vec::new(),
            fraction_digits: None,
            enums: Vec::new(),
            bits: Vec::new(),
            path: None,
            require_instance: None,
            bases: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn int8() -> TypeDecl {
        TypeDecl::new("int8")
    }

    pub fn int16() -> TypeDecl {
        TypeDecl::new("int16")
    }

    pub fn int32() -> TypeDecl {
        TypeDecl::new("int32")
    }

    pub fn int64() -> TypeDecl {
        TypeDecl::new("int64")
    }

    pub fn uint8() -> TypeDecl {
        TypeDecl::new("uint8")
    }

    pub fn uint16() -> TypeDecl {
        TypeDecl::new("uint16")
    }

    pub fn uint32() -> TypeDecl {
        TypeDecl::new("uint32")
    }

    pub fn uint64() -> TypeDecl {
        TypeDecl::new("uint64")
    }

    pub fn decimal64(fraction_digits: u8) -> TypeDecl {
        let mut decl = TypeDecl::new("decimal64");
        decl.fraction_digits = Some(fraction_digits);
        decl
    }

    pub fn string() -> TypeDecl {
        TypeDecl::new("string")
    }

    pub fn boolean() -> TypeDecl {
        TypeDecl::new("boolean")
    }

    pub fn empty() -> TypeDecl {
        TypeDecl::new("empty")
    }

    pub fn binary() -> TypeDecl {
        TypeDecl::new("binary")
    }

    pub fn enumeration(names: &[&str]) -> TypeDecl {
        let mut decl = TypeDecl::new("enumeration");
        decl.enums = names
            .iter()
            .map(|name| EnumDecl {
                name: name.to_string(),
                value: None,
                status: Status::Current,
            })
            .collect();
        decl
    }

    pub fn bits_type() -> TypeDecl {
        TypeDecl::new("bits")
    }

    pub fn leafref(path: &str) -> TypeDecl {
        let mut decl = TypeDecl::new("leafref");
        decl.path = Some(path.to_string());
        decl
    }

    pub fn identityref(bases: &[&str]) -> TypeDecl {
        let mut decl = TypeDecl::new("identityref");
        decl.bases = bases.iter().map(|base| base.to_string()).collect();
        decl
    }

    pub fn instance_identifier() -> TypeDecl {
        TypeDecl::new("instance-identifier")
    }

    pub fn union(members: Vec<TypeDecl>) -> TypeDecl {
        let mut decl = TypeDecl::new("union");
        decl.members = members;
        decl
    }

    pub fn range(mut self, range: &str) -> TypeDecl {
        self.range = Some(range.to_string());
        self
    }

    pub fn length(mut self, length: &str) -> TypeDecl {
        self.length = Some(length.to_string());
        self
    }

    pub fn pattern(mut self, pattern: &str) -> TypeDecl {
        self.patterns.push(PatternDecl {
            pattern: pattern.to_string(),
            invert_match: false,
        });
        self
    }

    pub fn pattern_inverted(mut self, pattern: &str) -> TypeDecl {
        self.patterns.push(PatternDecl {
            pattern: pattern.to_string(),
            invert_match: true,
        });
        self
    }

    pub fn enum_value(mut self, name: &str, value: i32) -> TypeDecl {
        self.enums.push(EnumDecl {
            name: name.to_string(),
            value: Some(value),
            status: Status::Current,
        });
        self
    }

    pub fn enum_name(mut self, name: &str) -> TypeDecl {
        self.enums.push(EnumDecl {
            name: name.to_string(),
            value: None,
            status: Status::Current,
        });
        self
    }

    pub fn bit(mut self, name: &str, position: Option<u32>) -> TypeDecl {
        self.bits.push(BitDecl {
            name: name.to_string(),
            position,
        });
        self
    }

    pub fn require_instance(mut self, require: bool) -> TypeDecl {
        self.require_instance = Some(require);
        self
    }
}
