use yangcore::builder::{
    AugmentDecl, DataDecl, DeviateDecl, DeviationDecl, FeatureDecl,
    GroupingDecl, IdentityDecl, ModuleDecl, RefineDecl, SubmoduleDecl,
    TypeDecl, TypedefDecl,
};
use yangcore::context::{Context, ContextFlags};
use yangcore::schema::{
    DataValueType, SchemaNodeKind, SchemaPathFormat, Status,
};
use yangcore::ErrorKind;

fn interfaces_module() -> ModuleDecl {
    ModuleDecl::new("interfaces", "urn:example:interfaces", "if")
        .revision("2026-01-15")
        .revision("2025-06-01")
        .typedef(TypedefDecl::new(
            "if-name",
            TypeDecl::string().length("1..63"),
        ))
        .node(
            DataDecl::container("interfaces").child(
                DataDecl::list("interface", &["name"])
                    .child(DataDecl::leaf("name", TypeDecl::new("if-name")))
                    .child(DataDecl::leaf(
                        "description",
                        TypeDecl::string(),
                    ))
                    .child(
                        DataDecl::leaf("enabled", TypeDecl::boolean())
                            .default("true"),
                    )
                    .child(
                        DataDecl::leaf(
                            "mtu",
                            TypeDecl::uint16().range("68..max"),
                        )
                        .units("octets"),
                    ),
            ),
        )
        .node(
            DataDecl::container("interfaces-state")
                .config(false)
                .child(
                    DataDecl::list("interface", &[])
                        .child(DataDecl::leaf("name", TypeDecl::string()))
                        .child(DataDecl::leaf(
                            "in-octets",
                            TypeDecl::uint64(),
                        )),
                ),
        )
}

fn create_context() -> Context {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(interfaces_module(), &[])
        .expect("Failed to load module");
    ctx
}

#[test]
fn schema_module_attributes() {
    let ctx = create_context();
    let module = ctx.get_module_latest("interfaces").unwrap();
    assert_eq!(module.name(), "interfaces");
    assert_eq!(module.namespace(), "urn:example:interfaces");
    assert_eq!(module.prefix(), "if");
    // Revisions are sorted newest first.
    assert_eq!(module.revision(), Some("2026-01-15"));
    assert_eq!(
        module.revisions().collect::<Vec<_>>(),
        vec!["2026-01-15", "2025-06-01"]
    );
    assert!(module.is_implemented());
}

#[test]
fn schema_find_xpath() {
    let ctx = create_context();
    assert_eq!(
        ctx.find_xpath("/interfaces:interfaces/interface/*")
            .expect("Failed to lookup schema data")
            .map(|snode| snode.path(SchemaPathFormat::DATA))
            .collect::<Vec<String>>(),
        vec![
            "/interfaces:interfaces/interface/name",
            "/interfaces:interfaces/interface/description",
            "/interfaces:interfaces/interface/enabled",
            "/interfaces:interfaces/interface/mtu",
        ]
    );
}

#[test]
fn schema_find_path() {
    let ctx = create_context();
    assert!(ctx
        .find_path("/interfaces:interfaces/interface/*")
        .is_err());
    let snode = ctx
        .find_path("/interfaces:interfaces/interface")
        .expect("Failed to lookup schema node");
    assert_eq!(snode.kind(), SchemaNodeKind::List);
    assert_eq!(snode.name(), "interface");
}

#[test]
fn schema_iterator_traverse() {
    let ctx = create_context();
    let module = ctx.get_module_latest("interfaces").unwrap();
    assert_eq!(
        module
            .traverse()
            .map(|snode| snode.path(SchemaPathFormat::LOG))
            .collect::<Vec<String>>(),
        vec![
            "/interfaces:interfaces",
            "/interfaces:interfaces/interface",
            "/interfaces:interfaces/interface/name",
            "/interfaces:interfaces/interface/description",
            "/interfaces:interfaces/interface/enabled",
            "/interfaces:interfaces/interface/mtu",
            "/interfaces:interfaces-state",
            "/interfaces:interfaces-state/interface",
            "/interfaces:interfaces-state/interface/name",
            "/interfaces:interfaces-state/interface/in-octets",
        ]
    );
}

#[test]
fn schema_iterator_ancestors() {
    let ctx = create_context();
    let snode = ctx
        .find_path("/interfaces:interfaces/interface/mtu")
        .unwrap();
    assert_eq!(
        snode
            .ancestors()
            .map(|snode| snode.name().to_string())
            .collect::<Vec<String>>(),
        vec!["interface", "interfaces"]
    );
}

#[test]
fn schema_node_attributes() {
    let ctx = create_context();

    let list = ctx.find_path("/interfaces:interfaces/interface").unwrap();
    assert_eq!(list.kind(), SchemaNodeKind::List);
    assert!(list.is_config());
    assert!(!list.is_keyless_list());
    assert_eq!(
        list.list_keys().map(|k| k.name().to_string()).collect::<Vec<_>>(),
        vec!["name"]
    );

    let name = ctx
        .find_path("/interfaces:interfaces/interface/name")
        .unwrap();
    assert!(name.is_list_key());
    assert!(name.is_mandatory());
    let ltype = name.leaf_type().unwrap();
    assert_eq!(ltype.base_type(), DataValueType::String);
    assert_eq!(ltype.typedef_name(), Some("if-name".to_string()));

    let enabled = ctx
        .find_path("/interfaces:interfaces/interface/enabled")
        .unwrap();
    assert!(enabled.has_default());
    assert_eq!(enabled.default_value_canonical(), Some("true"));

    let mtu = ctx
        .find_path("/interfaces:interfaces/interface/mtu")
        .unwrap();
    assert_eq!(mtu.units(), Some("octets"));

    let state_list = ctx
        .find_path("/interfaces:interfaces-state/interface")
        .unwrap();
    assert!(state_list.is_state());
    assert!(state_list.is_keyless_list());
}

#[test]
fn schema_feature_gating() {
    let decl = ModuleDecl::new("feat", "urn:feat", "f")
        .feature(FeatureDecl::new("routing"))
        .feature(FeatureDecl::new("bgp").if_feature("routing"))
        .node(
            DataDecl::leaf("router-id", TypeDecl::string())
                .if_feature("routing"),
        )
        .node(DataDecl::leaf("plain", TypeDecl::string()));

    // No features enabled: the gated leaf is not compiled.
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl.clone(), &[]).unwrap();
    let module = ctx.get_module_latest("feat").unwrap();
    assert_eq!(module.feature_value("routing"), Ok(false));
    assert_eq!(module.feature_value("bgp"), Ok(false));
    assert!(module.feature_value("nonexistent").is_err());
    assert!(ctx.find_path("/feat:router-id").is_err());
    assert!(ctx.find_path("/feat:plain").is_ok());

    // With the feature enabled the leaf appears.
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl.clone(), &["routing"]).unwrap();
    let module = ctx.get_module_latest("feat").unwrap();
    assert_eq!(module.feature_value("routing"), Ok(true));
    assert!(ctx.find_path("/feat:router-id").is_ok());

    // '*' enables everything, including dependent features.
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl, &["*"]).unwrap();
    let module = ctx.get_module_latest("feat").unwrap();
    assert_eq!(module.feature_value("bgp"), Ok(true));
}

#[test]
fn schema_grouping_expansion() {
    let decl = ModuleDecl::new("grp", "urn:grp", "g")
        .grouping(
            GroupingDecl::new("endpoint")
                .node(DataDecl::leaf("address", TypeDecl::string()))
                .node(
                    DataDecl::leaf(
                        "port",
                        TypeDecl::uint16().range("1..max"),
                    )
                    .default("8080"),
                ),
        )
        .node(
            DataDecl::container("server").child(
                DataDecl::uses("endpoint")
                    .refine(RefineDecl::new("port").default("443")),
            ),
        )
        .node(DataDecl::container("client").child(DataDecl::uses("endpoint")));

    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl, &[]).unwrap();

    // Both expansion sites carry the grouping's children.
    assert!(ctx.find_path("/grp:server/address").is_ok());
    assert!(ctx.find_path("/grp:client/address").is_ok());

    // The refine tightened the default at one site only.
    let server_port = ctx.find_path("/grp:server/port").unwrap();
    assert_eq!(server_port.default_value_canonical(), Some("443"));
    let client_port = ctx.find_path("/grp:client/port").unwrap();
    assert_eq!(client_port.default_value_canonical(), Some("8080"));
}

#[test]
fn schema_augment() {
    let base = ModuleDecl::new("base", "urn:base", "b").node(
        DataDecl::container("system")
            .child(DataDecl::leaf("hostname", TypeDecl::string())),
    );
    let extension = ModuleDecl::new("ext", "urn:ext", "e")
        .import("base", "b", None)
        .augment(
            AugmentDecl::new("/b:system")
                .node(DataDecl::leaf("location", TypeDecl::string())),
        );

    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(base, &[]).unwrap();
    ctx.load_module(extension, &[]).unwrap();

    let grafted = ctx.find_path("/base:system/ext:location").unwrap();
    assert_eq!(grafted.module().name(), "ext");
    assert_eq!(
        grafted.path(SchemaPathFormat::DATA),
        "/base:system/ext:location"
    );

    // Conflicting names at the graft point fail.
    let conflicting = ModuleDecl::new("ext2", "urn:ext2", "e2")
        .import("base", "b", None)
        .augment(
            AugmentDecl::new("/b:system")
                .node(DataDecl::leaf("hostname", TypeDecl::string())),
        );
    let err = ctx.load_module(conflicting, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateIdentifier);
}

#[test]
fn schema_deviation_not_supported() {
    let base = ModuleDecl::new("base", "urn:base", "b").node(
        DataDecl::container("system")
            .child(DataDecl::leaf("hostname", TypeDecl::string()))
            .child(DataDecl::leaf("location", TypeDecl::string())),
    );
    let deviations = ModuleDecl::new("devs", "urn:devs", "d")
        .import("base", "b", None)
        .deviation(
            DeviationDecl::new("/b:system/b:location")
                .deviate(DeviateDecl::NotSupported),
        );

    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(base, &[]).unwrap();
    ctx.load_module(deviations, &[]).unwrap();

    assert!(ctx.find_path("/base:system/hostname").is_ok());
    assert!(ctx.find_path("/base:system/location").is_err());
}

#[test]
fn schema_identity_dag() {
    let decl = ModuleDecl::new("ident", "urn:ident", "i")
        .identity(IdentityDecl::new("ethernet"))
        .identity(IdentityDecl::new("fast-ethernet").base("ethernet"))
        .identity(IdentityDecl::new("gig-ethernet").base("fast-ethernet"));
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl, &[]).unwrap();

    // A cycle is rejected.
    let cyclic = ModuleDecl::new("cyc", "urn:cyc", "c")
        .identity(IdentityDecl::new("a").base("b"))
        .identity(IdentityDecl::new("b").base("a"));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(cyclic, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircularDependency);
}

#[test]
fn schema_import_cycle() {
    let a = ModuleDecl::new("a", "urn:a", "a").import("b", "b", None);
    let b = ModuleDecl::new("b", "urn:b", "b").import("a", "a", None);
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_modules(vec![a, b], &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircularDependency);
    // The failed load leaves the context unchanged.
    assert!(ctx.get_module_latest("a").is_none());
    assert!(ctx.get_module_latest("b").is_none());
}

#[test]
fn schema_include_cycle() {
    let decl = ModuleDecl::new("m", "urn:m", "m")
        .include(SubmoduleDecl::new("s1").include("s2"))
        .include(SubmoduleDecl::new("s2").include("s1"));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(decl, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircularDependency);
}

#[test]
fn schema_duplicate_identifiers() {
    let decl = ModuleDecl::new("dup", "urn:dup", "d")
        .typedef(TypedefDecl::new("t", TypeDecl::string()))
        .typedef(TypedefDecl::new("t", TypeDecl::uint8()));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(decl, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateIdentifier);

    let decl = ModuleDecl::new("dup2", "urn:dup2", "d")
        .node(DataDecl::leaf("x", TypeDecl::string()))
        .node(DataDecl::leaf("x", TypeDecl::string()));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(decl, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateIdentifier);
}

#[test]
fn schema_leafref_binding() {
    let decl = ModuleDecl::new("lr", "urn:lr", "l")
        .node(DataDecl::leaf("q", TypeDecl::string()))
        .node(DataDecl::leaf("p", TypeDecl::leafref("../q")));
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl, &[]).unwrap();
    let p = ctx.find_path("/lr:p").unwrap();
    let ltype = p.leaf_type().unwrap();
    assert_eq!(ltype.base_type(), DataValueType::LeafRef);
    assert_eq!(
        ltype.leafref_real_type().unwrap().base_type(),
        DataValueType::String
    );

    // A leafref that cannot be resolved is a load error.
    let broken = ModuleDecl::new("lr2", "urn:lr2", "l")
        .node(DataDecl::leaf("p", TypeDecl::leafref("../missing")));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(broken, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnresolvedReference);
}

#[test]
fn schema_leafref_cycle() {
    let decl = ModuleDecl::new("cyc", "urn:cyc", "c")
        .node(DataDecl::leaf("p", TypeDecl::leafref("../q")))
        .node(DataDecl::leaf("q", TypeDecl::leafref("../p")));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(decl, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircularDependency);
}

#[test]
fn schema_status_gating() {
    let decl = ModuleDecl::new("st", "urn:st", "s")
        .node(
            DataDecl::leaf("old", TypeDecl::string())
                .status(Status::Obsolete),
        )
        .node(DataDecl::leaf("p", TypeDecl::leafref("../old")));

    // A current definition referencing an obsolete one is rejected.
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(decl.clone(), &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StatusDowngrade);

    // Unless the context demotes it to a warning.
    let mut ctx = Context::new(ContextFlags::STATUS_WARN_ONLY);
    ctx.load_module(decl, &[]).unwrap();
}

#[test]
fn schema_xpath_dependency_flags() {
    let decl = ModuleDecl::new("dep", "urn:dep", "d")
        .node(DataDecl::leaf("oper", TypeDecl::string()).config(false))
        .node(DataDecl::leaf("conf", TypeDecl::string()))
        .node(
            DataDecl::leaf("w1", TypeDecl::string())
                .when("../oper = 'up'"),
        )
        .node(
            DataDecl::leaf("w2", TypeDecl::string())
                .when("../conf = 'on'"),
        );
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl, &[]).unwrap();

    let w1 = ctx.find_path("/dep:w1").unwrap();
    assert!(w1.xpath_depends_on_state());
    assert!(!w1.xpath_depends_on_config());
    let w2 = ctx.find_path("/dep:w2").unwrap();
    assert!(w2.xpath_depends_on_config());
    assert!(!w2.xpath_depends_on_state());
}

#[test]
fn schema_rpc_and_notification() {
    let decl = ModuleDecl::new("op", "urn:op", "o")
        .node(
            DataDecl::rpc("restart")
                .input_node(DataDecl::leaf("delay", TypeDecl::uint32()))
                .output_node(DataDecl::leaf("time", TypeDecl::string())),
        )
        .node(
            DataDecl::notification("link-down")
                .child(DataDecl::leaf("if-name", TypeDecl::string())),
        );
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(decl, &[]).unwrap();
    let module = ctx.get_module_latest("op").unwrap();

    let rpc = module.rpcs().next().unwrap();
    assert_eq!(rpc.kind(), SchemaNodeKind::Rpc);
    let input = rpc.input().unwrap();
    let delay = input.children().next().unwrap();
    assert_eq!(delay.name(), "delay");
    assert!(delay.is_within_input());
    let output = rpc.output().unwrap();
    let time = output.children().next().unwrap();
    assert!(time.is_within_output());

    let notif = module.notifications().next().unwrap();
    assert_eq!(notif.kind(), SchemaNodeKind::Notification);
    assert!(notif.children().next().unwrap().is_within_notification());
}

#[test]
fn schema_type_restrictions() {
    // Derived ranges must stay within the base.
    let decl = ModuleDecl::new("t", "urn:t", "t")
        .typedef(TypedefDecl::new(
            "small",
            TypeDecl::uint8().range("0..10"),
        ))
        .node(DataDecl::leaf("x", TypeDecl::new("small").range("0..100")));
    let mut ctx = Context::new(ContextFlags::empty());
    assert!(ctx.load_module(decl, &[]).is_err());

    // Derived enumerations may only restrict the base set.
    let decl = ModuleDecl::new("t2", "urn:t2", "t")
        .typedef(TypedefDecl::new(
            "color",
            TypeDecl::enumeration(&["red", "green", "blue"]),
        ))
        .node(DataDecl::leaf(
            "x",
            TypeDecl::new("color").enum_name("purple"),
        ));
    let mut ctx = Context::new(ContextFlags::empty());
    let err = ctx.load_module(decl, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidEnum);
}
