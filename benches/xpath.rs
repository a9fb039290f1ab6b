use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use yangcore::builder::{DataDecl, ModuleDecl, TypeDecl};
use yangcore::context::{Context, ContextFlags};
use yangcore::data::{Data, DataTree};
use yangcore::xpath::XPathOptions;

fn create_context() -> Context {
    let mut ctx = Context::new(ContextFlags::empty());
    ctx.load_module(
        ModuleDecl::new("bench", "urn:bench", "b").node(
            DataDecl::container("interfaces").child(
                DataDecl::list("interface", &["name"])
                    .child(DataDecl::leaf("name", TypeDecl::string()))
                    .child(DataDecl::leaf("mtu", TypeDecl::uint16()))
                    .child(
                        DataDecl::leaf("enabled", TypeDecl::boolean())
                            .default("true"),
                    ),
            ),
        ),
        &[],
    )
    .expect("Failed to load module");
    ctx
}

fn data_generate(ctx: &Context, interfaces: u32) -> DataTree<'_> {
    let mut dtree = DataTree::new(ctx);

    for i in 1..=interfaces {
        let changes = [
            (
                format!("/bench:interfaces/interface[name='eth{}']", i),
                None,
            ),
            (
                format!(
                    "/bench:interfaces/interface[name='eth{}']/mtu",
                    i
                ),
                Some("1500"),
            ),
        ];
        for (xpath, value) in &changes {
            dtree
                .new_path(xpath, *value)
                .expect("Failed to edit data tree");
        }
    }

    dtree
}

fn criterion_benchmark(c: &mut Criterion) {
    let tree_sizes = [64, 256, 1024, 4 * 1024];

    let ctx = create_context();
    let module = ctx.get_module_latest("bench").unwrap();
    let count_expr = ctx
        .compile_xpath("count(/interfaces/interface[mtu = 1500])")
        .unwrap();

    let mut group = c.benchmark_group("XPath evaluate / tree size");
    for size in &tree_sizes {
        let dtree = data_generate(&ctx, *size);

        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            size,
            |b, _| {
                b.iter(|| {
                    dtree
                        .eval_xpath(
                            &count_expr,
                            &module,
                            XPathOptions::empty(),
                        )
                        .unwrap()
                });
            },
        );
    }
    group.finish();

    let mut group = c.benchmark_group("XPath compile");
    group.bench_function("when-style expression", |b| {
        b.iter(|| {
            ctx.compile_xpath(
                "../interface[name = current()/../name]/enabled = 'true'",
            )
            .unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
