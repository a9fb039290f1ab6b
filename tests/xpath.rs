use yangcore::builder::{DataDecl, ModuleDecl, TypeDecl};
use yangcore::context::{Context, ContextFlags};
use yangcore::data::{Data, DataTree};
use yangcore::schema::SchemaModule;
use yangcore::xpath::{XPathOptions, XPathValue};

fn create_context() -> Context {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("test", "urn:test", "t")
            .node(
                DataDecl::container("a")
                    .child(DataDecl::leaf("x", TypeDecl::int32()))
                    .child(DataDecl::leaf("y", TypeDecl::int32()))
                    .child(DataDecl::leaf_list("ll", TypeDecl::int32()))
                    .child(
                        DataDecl::list("l", &["k"])
                            .child(DataDecl::leaf("k", TypeDecl::string()))
                            .child(DataDecl::leaf(
                                "v",
                                TypeDecl::int32(),
                            )),
                    ),
            )
            .node(
                DataDecl::leaf(
                    "e",
                    TypeDecl::enumeration(&["zero", "one", "two"]),
                ),
            )
            .node(
                DataDecl::leaf(
                    "flags",
                    TypeDecl::bits_type()
                        .bit("debug", Some(0))
                        .bit("verbose", Some(3)),
                ),
            ),
        &[],
    )
    .unwrap();
    ctx
}

fn eval<'a>(
    tree: &'a DataTree<'a>,
    module: &SchemaModule<'_>,
    expr: &str,
) -> XPathValue<'a> {
    let compiled = tree
        .context()
        .compile_xpath(expr)
        .unwrap_or_else(|e| panic!("compile {}: {}", expr, e));
    tree.eval_xpath(&compiled, module, XPathOptions::empty())
        .unwrap_or_else(|e| panic!("eval {}: {}", expr, e))
}

fn eval_num(
    tree: &DataTree<'_>,
    module: &SchemaModule<'_>,
    expr: &str,
) -> f64 {
    match eval(tree, module, expr) {
        XPathValue::Number(n) => n,
        other => panic!("{}: expected a number, got {:?}", expr, other),
    }
}

fn eval_str(
    tree: &DataTree<'_>,
    module: &SchemaModule<'_>,
    expr: &str,
) -> String {
    match eval(tree, module, expr) {
        XPathValue::String(s) => s,
        other => panic!("{}: expected a string, got {:?}", expr, other),
    }
}

fn eval_bool(
    tree: &DataTree<'_>,
    module: &SchemaModule<'_>,
    expr: &str,
) -> bool {
    match eval(tree, module, expr) {
        XPathValue::Boolean(b) => b,
        other => panic!("{}: expected a boolean, got {:?}", expr, other),
    }
}

#[test]
fn xpath_arithmetic_precedence() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let tree = DataTree::new(&ctx);

    assert_eq!(eval_num(&tree, &module, "1 + 2 * 3"), 7.0);
    assert_eq!(eval_num(&tree, &module, "(1 + 2) * 3"), 9.0);
    assert_eq!(eval_num(&tree, &module, "7 mod 3"), 1.0);
    assert_eq!(eval_num(&tree, &module, "10 div 4"), 2.5);
    assert_eq!(eval_num(&tree, &module, "-2 + 5"), 3.0);
    assert_eq!(eval_num(&tree, &module, "2 * -3"), -6.0);
    assert!(eval_num(&tree, &module, "1 div 0") == f64::INFINITY);
    assert!(eval_num(&tree, &module, "0 div 0").is_nan());
}

#[test]
fn xpath_union_dedup() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    tree.new_path("/test:a/x", Some("1")).unwrap();
    tree.new_path("/test:a/y", Some("2")).unwrap();

    // Duplicates are eliminated and document order is kept.
    match eval(&tree, &module, "/a/x | /a/x | /a/y") {
        XPathValue::Nodes(nodes) => {
            assert_eq!(
                nodes
                    .iter()
                    .map(|dnode| dnode.path())
                    .collect::<Vec<_>>(),
                vec!["/test:a/x", "/test:a/y"]
            );
        }
        other => panic!("expected nodes, got {:?}", other),
    }

    // Reversed union operands still come back in document order.
    match eval(&tree, &module, "/a/y | /a/x") {
        XPathValue::Nodes(nodes) => {
            assert_eq!(
                nodes
                    .iter()
                    .map(|dnode| dnode.path())
                    .collect::<Vec<_>>(),
                vec!["/test:a/x", "/test:a/y"]
            );
        }
        other => panic!("expected nodes, got {:?}", other),
    }
}

#[test]
fn xpath_comparisons() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    tree.new_path("/test:a/x", Some("1")).unwrap();
    tree.new_path("/test:a/y", Some("2")).unwrap();

    assert!(eval_bool(&tree, &module, "/a/x = 1"));
    assert!(!eval_bool(&tree, &module, "/a/x = 2"));
    assert!(eval_bool(&tree, &module, "/a/x != 2"));
    assert!(eval_bool(&tree, &module, "/a/x < /a/y"));
    assert!(eval_bool(&tree, &module, "/a/y >= 2"));
    // Existential semantics: some member matches.
    assert!(eval_bool(&tree, &module, "/a/* = 2"));
    assert!(eval_bool(&tree, &module, "/a/* != 2"));
    // Comparison against an empty node-set is always false.
    assert!(!eval_bool(&tree, &module, "/a/ll = 1"));
    assert!(!eval_bool(&tree, &module, "/a/ll != 1"));
}

#[test]
fn xpath_predicates_and_positions() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    for (k, v) in [("a", "10"), ("b", "20"), ("c", "30")] {
        tree.new_path(&format!("/test:a/l[k='{}']/v", k), Some(v))
            .unwrap();
    }

    assert_eq!(eval_num(&tree, &module, "count(/a/l)"), 3.0);
    assert_eq!(
        eval_num(&tree, &module, "count(/a/l[v > 15])"),
        2.0
    );
    // Positional predicate.
    match eval(&tree, &module, "/a/l[2]/k") {
        XPathValue::Nodes(nodes) => {
            assert_eq!(nodes[0].value_canonical(), Some("b".to_string()));
        }
        other => panic!("expected nodes, got {:?}", other),
    }
    assert_eq!(
        eval_num(&tree, &module, "count(/a/l[position() = last()])"),
        1.0
    );
    // Key predicate.
    assert_eq!(
        eval_num(&tree, &module, "sum(/a/l[k='a']/v | /a/l[k='c']/v)"),
        40.0
    );
}

#[test]
fn xpath_descendants() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    tree.new_path("/test:a/l[k='a']/v", Some("10")).unwrap();
    tree.new_path("/test:a/l[k='b']/v", Some("20")).unwrap();

    assert_eq!(eval_num(&tree, &module, "count(//k)"), 2.0);
    assert_eq!(eval_num(&tree, &module, "count(//v)"), 2.0);
    assert_eq!(eval_num(&tree, &module, "sum(//v)"), 30.0);
    // `//` does not produce duplicates even though ancestors overlap.
    assert_eq!(eval_num(&tree, &module, "count(//l | /a/l)"), 2.0);
}

#[test]
fn xpath_string_functions() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let tree = DataTree::new(&ctx);

    assert_eq!(
        eval_str(&tree, &module, "concat('fe', '80', '::')"),
        "fe80::"
    );
    assert!(eval_bool(&tree, &module, "contains('hello', 'ell')"));
    assert!(eval_bool(&tree, &module, "starts-with('hello', 'he')"));
    assert_eq!(
        eval_str(&tree, &module, "substring('12345', 1.5, 2.6)"),
        "234"
    );
    assert_eq!(
        eval_str(&tree, &module, "substring-before('10.0.0.1', '.')"),
        "10"
    );
    assert_eq!(
        eval_str(&tree, &module, "substring-after('10.0.0.1', '.')"),
        "0.0.1"
    );
    assert_eq!(
        eval_str(&tree, &module, "normalize-space('  a  b   c ')"),
        "a b c"
    );
    assert_eq!(
        eval_str(&tree, &module, "translate('abc-d', 'abc-', 'ABC')"),
        "ABCd"
    );
    assert_eq!(eval_num(&tree, &module, "string-length('héllo')"), 5.0);
    assert_eq!(eval_str(&tree, &module, "string(2.5)"), "2.5");
    assert_eq!(eval_str(&tree, &module, "string(7)"), "7");
}

#[test]
fn xpath_number_functions() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let tree = DataTree::new(&ctx);

    assert_eq!(eval_num(&tree, &module, "floor(2.7)"), 2.0);
    assert_eq!(eval_num(&tree, &module, "ceiling(2.2)"), 3.0);
    assert_eq!(eval_num(&tree, &module, "round(2.5)"), 3.0);
    assert_eq!(eval_num(&tree, &module, "round(-2.5)"), -2.0);
    // round() of values in [-0.5, 0) is negative zero.
    let neg_zero = eval_num(&tree, &module, "round(-0.4)");
    assert_eq!(neg_zero, 0.0);
    assert!(neg_zero.is_sign_negative());
    assert_eq!(eval_num(&tree, &module, "number('42')"), 42.0);
    assert!(eval_num(&tree, &module, "number('x')").is_nan());
    assert_eq!(eval_num(&tree, &module, "number(true())"), 1.0);
}

#[test]
fn xpath_boolean_functions() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    tree.new_path("/test:a/x", Some("1")).unwrap();

    assert!(eval_bool(&tree, &module, "true()"));
    assert!(!eval_bool(&tree, &module, "false()"));
    assert!(eval_bool(&tree, &module, "not(false())"));
    assert!(eval_bool(&tree, &module, "boolean(/a/x)"));
    assert!(!eval_bool(&tree, &module, "boolean(/a/y)"));
    assert!(!eval_bool(&tree, &module, "boolean('')"));
    assert!(eval_bool(&tree, &module, "/a/x = 1 and true()"));
    assert!(eval_bool(&tree, &module, "/a/x = 2 or /a/x = 1"));
    assert!(!eval_bool(&tree, &module, "lang('en')"));
}

#[test]
fn xpath_node_functions() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    tree.new_path("/test:a/x", Some("1")).unwrap();

    // name() deliberately returns the local name, like local-name().
    assert_eq!(eval_str(&tree, &module, "name(/a/x)"), "x");
    assert_eq!(eval_str(&tree, &module, "local-name(/a/x)"), "x");
    assert_eq!(
        eval_str(&tree, &module, "namespace-uri(/a)"),
        "urn:test"
    );
    assert_eq!(eval_str(&tree, &module, "string(/a/x)"), "1");
    // id() is a no-op in YANG contexts.
    assert_eq!(eval_num(&tree, &module, "count(id('x'))"), 0.0);
}

#[test]
fn xpath_yang_functions() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let mut tree = DataTree::new(&ctx);
    tree.new_path("/test:e", Some("two")).unwrap();
    tree.new_path("/test:flags", Some("verbose debug")).unwrap();

    assert_eq!(eval_num(&tree, &module, "enum-value(/e)"), 2.0);
    assert!(eval_bool(&tree, &module, "bit-is-set(/flags, 'debug')"));
    assert!(eval_bool(&tree, &module, "bit-is-set(/flags, 'verbose')"));
    assert!(!eval_bool(&tree, &module, "bit-is-set(/flags, 'trace')"));
    // Bits canonical order follows bit positions.
    let flags = tree.find_path("/test:flags").unwrap();
    assert_eq!(
        flags.value_canonical(),
        Some("debug verbose".to_string())
    );

    assert!(eval_bool(
        &tree,
        &module,
        "re-match('192.168.1.1', '\\d+\\.\\d+\\.\\d+\\.\\d+')"
    ));
    assert!(!eval_bool(&tree, &module, "re-match('abc', '\\d+')"));
    // re-match anchors the pattern to the whole value.
    assert!(!eval_bool(&tree, &module, "re-match('abc123', '\\d+')"));
}

#[test]
fn xpath_current_and_deref() {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("dr", "urn:dr", "d")
            .node(
                DataDecl::list("servers", &["name"])
                    .child(DataDecl::leaf("name", TypeDecl::string()))
                    .child(DataDecl::leaf("port", TypeDecl::uint16())),
            )
            .node(DataDecl::leaf(
                "active",
                TypeDecl::leafref("../servers/name"),
            )),
        &[],
    )
    .unwrap();
    let module = ctx.get_module_latest("dr").unwrap();

    let mut tree = DataTree::new(&ctx);
    tree.new_path("/dr:servers[name='alpha']/port", Some("80"))
        .unwrap();
    tree.new_path("/dr:servers[name='beta']/port", Some("81"))
        .unwrap();
    tree.new_path("/dr:active", Some("beta")).unwrap();
    tree.validate(yangcore::data::DataValidationFlags::PRESENT)
        .unwrap();

    let active = tree.find_path("/dr:active").unwrap();
    let expr = ctx.compile_xpath("deref(.)/../port").unwrap();
    match active
        .eval_xpath(&expr, &module, XPathOptions::empty())
        .unwrap()
    {
        XPathValue::Nodes(nodes) => {
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].value_canonical(), Some("81".to_string()));
        }
        other => panic!("expected nodes, got {:?}", other),
    }

    // current() refers to the original context node inside predicates.
    let expr = ctx
        .compile_xpath("/servers[name = current()]/port")
        .unwrap();
    match active
        .eval_xpath(&expr, &module, XPathOptions::empty())
        .unwrap()
    {
        XPathValue::Nodes(nodes) => {
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].value_canonical(), Some("81".to_string()));
        }
        other => panic!("expected nodes, got {:?}", other),
    }
}

#[test]
fn xpath_compile_errors() {
    let ctx = Context::new(ContextFlags::empty());
    for bad in [
        "",
        "1 +",
        "'unterminated",
        "unknown-function()",
        "count()",
        "$variable",
        "a[",
        "//",
    ] {
        assert!(ctx.compile_xpath(bad).is_err(), "{:?} should fail", bad);
    }
}

#[test]
fn xpath_unknown_prefix() {
    let ctx = create_context();
    let module = ctx.get_module_latest("test").unwrap();
    let tree = DataTree::new(&ctx);
    let expr = ctx.compile_xpath("/nosuch:a").unwrap();
    assert!(tree
        .eval_xpath(&expr, &module, XPathOptions::empty())
        .is_err());
}
