use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use query_tree::ast::{GroupKind, NodeId, Operator, QueryTree, Term};
use query_tree::drag_drop::{apply_drop, DropIntent};
use query_tree::lexer::Lexer;
use query_tree::parser::Parser;
use query_tree::serializer::serialize;
use std::hint::black_box;

const TEST_CASES: [(&str, &str); 3] = [
    ("simple", r#"name:"asthma""#),
    ("medium", r#"name:"asthma" AND (covid OR name:influenza*) AND date:[2019 TO *]"#),
    (
        "complex",
        r#"((date:[2019 TO 2021] OR -_exists_:date) AND (name:*immune* OR description:(*immune* *dis*))) OR (_exists_:funding AND (malaria OR "west nile virus" OR name:*osis))"#,
    ),
];

// 构建一棵宽度为 width、深度为 depth 的查询树
fn build_tree(width: usize, depth: usize) -> QueryTree {
    let mut tree = QueryTree::default();
    let mut parents = vec![NodeId::root()];
    for level in 0..depth {
        let mut next = Vec::new();
        for parent in &parents {
            for i in 0..width {
                let term = Term::field("name", Operator::Contains, format!("term{}x{}", level, i));
                tree.add_term(parent, term).unwrap();
            }
            let kind = if level % 2 == 0 { GroupKind::Or } else { GroupKind::And };
            next.push(tree.add_group(parent, kind).unwrap());
        }
        parents = next;
    }
    tree
}

// 基准测试：词法分析性能
fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_performance");

    for (name, query) in TEST_CASES {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &query, |b, &query| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(query)).collect();
                black_box(tokens)
            })
        });
    }

    group.finish();
}

// 基准测试：语法分析性能
fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");

    for (name, query) in TEST_CASES {
        // 预先词法分析
        let tokens: Vec<_> = Lexer::new(query).collect();

        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| {
                let mut parser = Parser::new(black_box(tokens));
                black_box(parser.parse().unwrap())
            })
        });
    }

    group.finish();
}

// 基准测试：序列化性能
fn benchmark_serializer(c: &mut Criterion) {
    let mut group = c.benchmark_group("serializer_performance");

    for (width, depth) in [(2, 2), (4, 4), (8, 4)] {
        let tree = build_tree(width, depth);
        group.bench_with_input(
            BenchmarkId::new("serialize", format!("{}x{}", width, depth)),
            &tree,
            |b, tree| b.iter(|| black_box(serialize(black_box(tree)))),
        );
    }

    group.finish();
}

// 基准测试：变更与拖放性能
fn benchmark_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutation_performance");
    let tree = build_tree(8, 4);
    let ids = tree.ids();
    let source = ids[ids.len() - 1].clone();
    let target = ids[1].clone();

    group.bench_function("move_deep_leaf_to_top", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut tree| {
                tree.move_node(&source, &NodeId::root(), 0).unwrap();
                black_box(tree)
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.bench_function("drop_combine", |b| {
        b.iter_batched(
            || tree.clone(),
            |mut tree| {
                let outcome = apply_drop(&mut tree, &source, &target, DropIntent::CombineWith, GroupKind::And);
                black_box((tree, outcome))
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_serializer,
    benchmark_mutations
);
criterion_main!(benches);
