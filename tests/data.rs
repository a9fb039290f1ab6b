use yangcore::builder::{
    DataDecl, IdentityDecl, ModuleDecl, MustDecl, TypeDecl, TypedefDecl,
};
use yangcore::context::{Context, ContextFlags};
use yangcore::data::{
    Data, DataImplicitFlags, DataParserFlags, DataTree,
    DataValidationFlags,
};
use yangcore::schema::DataValue;
use yangcore::ErrorKind;

fn validate_present(
    tree: &mut DataTree<'_>,
) -> yangcore::Result<()> {
    tree.validate(DataValidationFlags::PRESENT)
}

#[test]
fn data_edit_and_find() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("net", "urn:net", "n").node(
            DataDecl::container("interfaces").child(
                DataDecl::list("interface", &["name"])
                    .child(DataDecl::leaf("name", TypeDecl::string()))
                    .child(DataDecl::leaf(
                        "description",
                        TypeDecl::string(),
                    ))
                    .child(
                        DataDecl::leaf("enabled", TypeDecl::boolean())
                            .default("true"),
                    ),
            ),
        ),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree
        .new_path(
            "/net:interfaces/interface[name='eth0']/description",
            Some("uplink"),
        )
        .expect("Failed to edit data tree");
    dtree
        .new_path("/net:interfaces/interface[name='eth1']", None)
        .expect("Failed to edit data tree");

    assert_eq!(
        dtree
            .find_xpath("/net:interfaces/interface")
            .expect("Failed to find nodes")
            .map(|dnode| dnode.path())
            .collect::<Vec<String>>(),
        vec![
            "/net:interfaces/interface[name='eth0']",
            "/net:interfaces/interface[name='eth1']",
        ]
    );

    let dnode = dtree
        .find_path("/net:interfaces/interface[name='eth0']/description")
        .unwrap();
    assert_eq!(dnode.value_canonical(), Some("uplink".to_string()));

    // Editing an existing leaf replaces its value.
    dtree
        .new_path(
            "/net:interfaces/interface[name='eth0']/description",
            Some("downlink"),
        )
        .unwrap();
    let dnode = dtree
        .find_path("/net:interfaces/interface[name='eth0']/description")
        .unwrap();
    assert_eq!(dnode.value_canonical(), Some("downlink".to_string()));

    dtree
        .remove("/net:interfaces/interface[name='eth1']")
        .unwrap();
    assert_eq!(
        dtree.find_xpath("/net:interfaces/interface").unwrap().count(),
        1
    );
}

#[test]
fn data_typed_values() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("vals", "urn:vals", "v")
            .typedef(TypedefDecl::new(
                "percent",
                TypeDecl::uint8().range("0..100"),
            ))
            .node(DataDecl::leaf("load", TypeDecl::new("percent")))
            .node(DataDecl::leaf("offset", TypeDecl::int32()))
            .node(DataDecl::leaf("ratio", TypeDecl::decimal64(2)))
            .node(DataDecl::leaf(
                "mixed",
                TypeDecl::union(vec![TypeDecl::int8(), TypeDecl::string()]),
            )),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);

    // Canonicalisation: hex lexical, decimal canonical.
    dtree.new_path("/vals:offset", Some("0x2A")).unwrap();
    let offset = dtree.find_path("/vals:offset").unwrap();
    assert_eq!(offset.value(), Some(DataValue::Int32(42)));
    assert_eq!(offset.value_canonical(), Some("42".to_string()));

    // Range constraints come from the whole typedef chain.
    assert!(dtree.new_path("/vals:load", Some("101")).is_err());
    dtree.new_path("/vals:load", Some("100")).unwrap();

    // Decimal64 canonical form drops trailing zeros.
    dtree.new_path("/vals:ratio", Some("1.50")).unwrap();
    let ratio = dtree.find_path("/vals:ratio").unwrap();
    assert_eq!(ratio.value_canonical(), Some("1.5".to_string()));

    // Unions pick the first member type that accepts the value.
    dtree.new_path("/vals:mixed", Some("7")).unwrap();
    let mixed = dtree.find_path("/vals:mixed").unwrap();
    assert_eq!(mixed.value(), Some(DataValue::Int8(7)));
}

#[test]
fn data_default_materialisation() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("dfl", "urn:dfl", "d").node(
            DataDecl::container("server")
                .child(DataDecl::leaf("address", TypeDecl::string()))
                .child(
                    DataDecl::leaf("port", TypeDecl::uint16())
                        .default("8080"),
                ),
        ),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/dfl:server/address", Some("::1")).unwrap();
    validate_present(&mut dtree).unwrap();

    let port = dtree.find_path("/dfl:server/port").unwrap();
    assert!(port.is_default());
    assert_eq!(port.value_canonical(), Some("8080".to_string()));

    // An explicit value is not marked as default.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/dfl:server/address", Some("::1")).unwrap();
    dtree.new_path("/dfl:server/port", Some("443")).unwrap();
    dtree.add_implicit(DataImplicitFlags::empty()).unwrap();
    let port = dtree.find_path("/dfl:server/port").unwrap();
    assert!(!port.is_default());
    assert_eq!(port.value_canonical(), Some("443".to_string()));
}

#[test]
fn data_when_auto_delete() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("cond", "urn:cond", "c")
            .node(DataDecl::leaf("a", TypeDecl::int8()))
            .node(DataDecl::leaf("b", TypeDecl::int8()).when("../a = 1")),
        &[],
    )
    .unwrap();

    // The when is false: with auto-delete the subtree is removed.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/cond:a", Some("2")).unwrap();
    dtree.new_path("/cond:b", Some("5")).unwrap();
    dtree
        .validate(
            DataValidationFlags::PRESENT
                | DataValidationFlags::WHEN_AUTO_DEL,
        )
        .unwrap();
    assert!(dtree.find_path("/cond:a").is_ok());
    assert!(dtree.find_path("/cond:b").is_err());

    // Without auto-delete the same input is a hard error.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/cond:a", Some("2")).unwrap();
    dtree.new_path("/cond:b", Some("5")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::WhenFalse);
    assert_eq!(err.path.as_deref(), Some("/cond:b"));

    // A true when keeps the node.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/cond:a", Some("1")).unwrap();
    dtree.new_path("/cond:b", Some("5")).unwrap();
    validate_present(&mut dtree).unwrap();
    assert!(dtree.find_path("/cond:b").is_ok());
}

#[test]
fn data_when_chained_deletes() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("chain", "urn:chain", "c")
            .node(DataDecl::leaf("a", TypeDecl::string()))
            .node(
                DataDecl::leaf("b", TypeDecl::string()).when("../a = 'on'"),
            )
            .node(
                DataDecl::leaf("c", TypeDecl::string()).when("../b = 'x'"),
            ),
        &[],
    )
    .unwrap();

    // Deleting b unblocks (and falsifies) the when of c.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/chain:a", Some("off")).unwrap();
    dtree.new_path("/chain:b", Some("x")).unwrap();
    dtree.new_path("/chain:c", Some("y")).unwrap();
    dtree
        .validate(
            DataValidationFlags::PRESENT
                | DataValidationFlags::WHEN_AUTO_DEL,
        )
        .unwrap();
    assert!(dtree.find_path("/chain:a").is_ok());
    assert!(dtree.find_path("/chain:b").is_err());
    assert!(dtree.find_path("/chain:c").is_err());

    // All conditions hold: everything stays.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/chain:a", Some("on")).unwrap();
    dtree.new_path("/chain:b", Some("x")).unwrap();
    dtree.new_path("/chain:c", Some("y")).unwrap();
    dtree
        .validate(
            DataValidationFlags::PRESENT
                | DataValidationFlags::WHEN_AUTO_DEL,
        )
        .unwrap();
    assert!(dtree.find_path("/chain:b").is_ok());
    assert!(dtree.find_path("/chain:c").is_ok());
}

#[test]
fn data_leafref() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("lr", "urn:lr", "l")
            .node(DataDecl::leaf("q", TypeDecl::string()))
            .node(DataDecl::leaf("p", TypeDecl::leafref("../q"))),
        &[],
    )
    .unwrap();

    // Target value missing: validation fails at the leafref.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/lr:q", Some("x")).unwrap();
    dtree.new_path("/lr:p", Some("y")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LeafrefNoTarget);
    assert_eq!(err.path.as_deref(), Some("/lr:p"));

    // Matching value: validation resolves the target node.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/lr:q", Some("x")).unwrap();
    dtree.new_path("/lr:p", Some("x")).unwrap();
    validate_present(&mut dtree).unwrap();
    let p = dtree.find_path("/lr:p").unwrap();
    let target = p.leafref_target().expect("leafref not resolved");
    assert_eq!(target.path(), "/lr:q");
    assert_eq!(target.value_canonical(), p.value_canonical());
}

#[test]
fn data_leafref_require_instance_false() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("lr2", "urn:lr2", "l")
            .node(DataDecl::leaf("q", TypeDecl::string()))
            .node(DataDecl::leaf(
                "p",
                TypeDecl::leafref("../q").require_instance(false),
            )),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/lr2:p", Some("dangling")).unwrap();
    validate_present(&mut dtree).unwrap();
    let p = dtree.find_path("/lr2:p").unwrap();
    assert!(p.leafref_target().is_none());
}

#[test]
fn data_derived_from_or_self() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("ident", "urn:ident", "i")
            .identity(IdentityDecl::new("base"))
            .identity(IdentityDecl::new("a").base("base"))
            .identity(IdentityDecl::new("b").base("a"))
            .identity(IdentityDecl::new("other"))
            .node(DataDecl::leaf("kind", TypeDecl::identityref(&["base"])))
            .node(DataDecl::leaf(
                "misc",
                TypeDecl::identityref(&["other"]),
            )),
        &[],
    )
    .unwrap();
    let module = ctx.get_module_latest("ident").unwrap();
    let expr = ctx
        .compile_xpath("derived-from-or-self(., 'base')")
        .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ident:kind", Some("b")).unwrap();
    dtree.new_path("/ident:misc", Some("other")).unwrap();

    // Transitively derived identity.
    let kind = dtree.find_path("/ident:kind").unwrap();
    assert_eq!(kind.value_canonical(), Some("ident:b".to_string()));
    match kind
        .eval_xpath(&expr, &module, Default::default())
        .unwrap()
    {
        yangcore::xpath::XPathValue::Boolean(value) => assert!(value),
        other => panic!("unexpected result: {:?}", other),
    }

    // The base itself satisfies derived-from-or-self but an unrelated
    // identity does not.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ident:kind", Some("base")).unwrap();
    dtree.new_path("/ident:misc", Some("other")).unwrap();
    let kind = dtree.find_path("/ident:kind").unwrap();
    match kind
        .eval_xpath(&expr, &module, Default::default())
        .unwrap()
    {
        yangcore::xpath::XPathValue::Boolean(value) => assert!(value),
        other => panic!("unexpected result: {:?}", other),
    }
    let misc = dtree.find_path("/ident:misc").unwrap();
    match misc
        .eval_xpath(&expr, &module, Default::default())
        .unwrap()
    {
        yangcore::xpath::XPathValue::Boolean(value) => assert!(!value),
        other => panic!("unexpected result: {:?}", other),
    }

    // A value not derived from the required base is rejected when
    // stored.
    let mut dtree = DataTree::new(&ctx);
    let err = dtree.new_path("/ident:kind", Some("other")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IdentityNotDerived);
}

#[test]
fn data_list_key_ordering() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("keys", "urn:keys", "k").node(
            DataDecl::list("l", &["k1", "k2"])
                .child(DataDecl::leaf("k1", TypeDecl::string()))
                .child(DataDecl::leaf("k2", TypeDecl::string()))
                .child(DataDecl::leaf("value", TypeDecl::string())),
        ),
        &[],
    )
    .unwrap();
    let list = ctx.find_path("/keys:l").unwrap();
    let k1 = ctx.find_path("/keys:l/k1").unwrap();
    let k2 = ctx.find_path("/keys:l/k2").unwrap();

    // Strict parsing rejects keys arriving out of document order.
    let mut dtree =
        DataTree::new_with_options(&ctx, DataParserFlags::STRICT);
    let instance = dtree.new_inner(None, &list).unwrap();
    dtree.new_term(Some(instance), &k2, "two").unwrap();
    let err = dtree.new_term(Some(instance), &k1, "one").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ListKey);

    // Without strict parsing the instance is accepted and the keys are
    // reordered into canonical (schema) order.
    let mut dtree = DataTree::new(&ctx);
    let instance = dtree.new_inner(None, &list).unwrap();
    dtree.new_term(Some(instance), &k2, "two").unwrap();
    dtree.new_term(Some(instance), &k1, "one").unwrap();
    dtree.new_path("/keys:l[k1='one'][k2='two']/value", Some("v")).unwrap();
    validate_present(&mut dtree).unwrap();
    assert_eq!(
        dtree
            .noderef(instance)
            .children()
            .map(|dnode| dnode.schema().name().to_string())
            .collect::<Vec<_>>(),
        vec!["k1", "k2", "value"]
    );
}

#[test]
fn data_list_structure() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("ls", "urn:ls", "l").node(
            DataDecl::list("srv", &["name"])
                .min_elements(1)
                .max_elements(2)
                .unique(&["address"])
                .child(DataDecl::leaf("name", TypeDecl::string()))
                .child(DataDecl::leaf("address", TypeDecl::string()))
                .child(
                    DataDecl::leaf("port", TypeDecl::uint16())
                        .mandatory(true),
                ),
        ),
        &[],
    )
    .unwrap();

    // Mandatory leaf missing.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ls:srv[name='a']/address", Some("10.0.0.1")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mandatory);

    // Valid single instance.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ls:srv[name='a']/address", Some("10.0.0.1")).unwrap();
    dtree.new_path("/ls:srv[name='a']/port", Some("80")).unwrap();
    validate_present(&mut dtree).unwrap();

    // Unique violation across instances.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ls:srv[name='a']/address", Some("10.0.0.1")).unwrap();
    dtree.new_path("/ls:srv[name='a']/port", Some("80")).unwrap();
    dtree.new_path("/ls:srv[name='b']/address", Some("10.0.0.1")).unwrap();
    dtree.new_path("/ls:srv[name='b']/port", Some("81")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unique);

    // max-elements violation.
    let mut dtree = DataTree::new(&ctx);
    for (name, addr) in
        [("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.3")]
    {
        let prefix = format!("/ls:srv[name='{}']", name);
        dtree
            .new_path(&format!("{}/address", prefix), Some(addr))
            .unwrap();
        dtree.new_path(&format!("{}/port", prefix), Some("80")).unwrap();
    }
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MinMaxElements);
}

#[test]
fn data_duplicate_instances() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("di", "urn:di", "d")
            .node(
                DataDecl::list("l", &["k"])
                    .child(DataDecl::leaf("k", TypeDecl::string())),
            )
            .node(DataDecl::leaf_list("tags", TypeDecl::string())),
        &[],
    )
    .unwrap();
    let list = ctx.find_path("/di:l").unwrap();
    let key = ctx.find_path("/di:l/k").unwrap();

    // Two list instances with the same key tuple.
    let mut dtree = DataTree::new(&ctx);
    let first = dtree.new_inner(None, &list).unwrap();
    dtree.new_term(Some(first), &key, "dup").unwrap();
    let second = dtree.new_inner(None, &list).unwrap();
    dtree.new_term(Some(second), &key, "dup").unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateInstance);

    // Duplicate values in a configuration leaf-list.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/di:tags", Some("x")).unwrap();
    dtree.new_path("/di:tags", Some("x")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateInstance);
}

#[test]
fn data_must_condition() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("mst", "urn:mst", "m").node(
            DataDecl::container("limits")
                .child(DataDecl::leaf("low", TypeDecl::int32()))
                .child(DataDecl::leaf("high", TypeDecl::int32()))
                .must(
                    MustDecl::new("low <= high")
                        .error_message("low must not exceed high")
                        .error_app_tag("limit-order"),
                ),
        ),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/mst:limits/low", Some("10")).unwrap();
    dtree.new_path("/mst:limits/high", Some("5")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MustFalse);
    assert_eq!(err.msg.as_deref(), Some("low must not exceed high"));
    assert_eq!(err.apptag.as_deref(), Some("limit-order"));

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/mst:limits/low", Some("5")).unwrap();
    dtree.new_path("/mst:limits/high", Some("10")).unwrap();
    validate_present(&mut dtree).unwrap();
}

#[test]
fn data_instance_identifier() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("iid", "urn:iid", "i")
            .node(
                DataDecl::list("l", &["k"])
                    .child(DataDecl::leaf("k", TypeDecl::string())),
            )
            .node(DataDecl::leaf("ptr", TypeDecl::instance_identifier())),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/iid:l[k='a']", None).unwrap();
    dtree.new_path("/iid:ptr", Some("/iid:l[k='a']")).unwrap();
    validate_present(&mut dtree).unwrap();
    let ptr = dtree.find_path("/iid:ptr").unwrap();
    assert_eq!(
        ptr.leafref_target().unwrap().path(),
        "/iid:l[k='a']"
    );

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/iid:ptr", Some("/iid:l[k='missing']")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InstanceIdNoTarget);
}

#[test]
fn data_choice_validation() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("ch", "urn:ch", "c").node(
            DataDecl::container("transport").child(
                DataDecl::choice("proto")
                    .mandatory(true)
                    .child(DataDecl::leaf("tcp-port", TypeDecl::uint16()))
                    .child(DataDecl::leaf("udp-port", TypeDecl::uint16())),
            ),
        ),
        &[],
    )
    .unwrap();

    // A mandatory choice with no case instantiated fails.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ch:transport", None).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mandatory);

    // One case is fine.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ch:transport/tcp-port", Some("80")).unwrap();
    validate_present(&mut dtree).unwrap();

    // Data from two cases of the same choice is rejected.
    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/ch:transport/tcp-port", Some("80")).unwrap();
    dtree.new_path("/ch:transport/udp-port", Some("53")).unwrap();
    let err = validate_present(&mut dtree).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidData);
}

#[test]
fn data_state_rejected() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("cs", "urn:cs", "c")
            .node(DataDecl::leaf("conf", TypeDecl::string()))
            .node(DataDecl::leaf("oper", TypeDecl::string()).config(false)),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/cs:oper", Some("up")).unwrap();
    let err = dtree
        .validate(
            DataValidationFlags::PRESENT | DataValidationFlags::NO_STATE,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidData);

    let mut dtree = DataTree::new(&ctx);
    dtree.new_path("/cs:oper", Some("up")).unwrap();
    validate_present(&mut dtree).unwrap();
}

#[test]
fn data_metadata() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("md", "urn:md", "m")
            .node(DataDecl::leaf("x", TypeDecl::string())),
        &[],
    )
    .unwrap();

    let mut dtree = DataTree::new(&ctx);
    let id = dtree.new_path("/md:x", Some("v")).unwrap();
    dtree.new_meta(id, Some("ietf-netconf"), "operation", "merge");

    let dnode = dtree.find_path("/md:x").unwrap();
    let meta: Vec<_> = dnode.meta().collect();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].name(), "operation");
    assert_eq!(meta[0].value(), "merge");
    assert_eq!(meta[0].module_name(), Some("ietf-netconf"));
}
