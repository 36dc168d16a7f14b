//! Benchmarks for redex matching and rule application.
//!
//! Measures:
//! - Plain enumeration of all matches of a one-node redex
//! - Weighted search for the best match
//! - One rewriting step over every match
//!
//! Agents are flat regions of `n` nodes `A[x]{ B }` sharing the outer name `x`.

use bigraphs::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn signature() -> Arc<Signature> {
    SignatureBuilder::new()
        .add("A", true, 1)
        .add("B", true, 0)
        .build()
        .unwrap()
}

fn agent(sig: &Arc<Signature>, n: usize) -> Bigraph {
    let mut b = BigraphBuilder::new(sig.clone());
    let root = b.add_root();
    let x = b.add_outer_name("x").unwrap();
    for _ in 0..n {
        let a = b.add_node("A", root.into(), &[x.into()]).unwrap();
        b.add_node("B", a.into(), &[]).unwrap();
    }
    b.freeze()
}

/// `A[y]{ site }`, with an extra `B` inside when `grow` is set.
fn open_a(sig: &Arc<Signature>, grow: bool) -> Bigraph {
    let mut b = BigraphBuilder::new(sig.clone());
    let root = b.add_root();
    let y = b.add_outer_name("y").unwrap();
    let a = b.add_node("A", root.into(), &[y.into()]).unwrap();
    b.add_site(a.into()).unwrap();
    if grow {
        b.add_node("B", a.into(), &[]).unwrap();
    }
    b.freeze()
}

struct ByChildren;

impl MatchPolicy for ByChildren {
    fn weight(&self, agent: &Bigraph, node: NodeId, _redex: &Bigraph, _redex_node: NodeId) -> i64 {
        agent.children(node.into()).map_or(0, |c| c.len() as i64)
    }
}

fn bench_enumeration(c: &mut Criterion) {
    let sig = signature();
    let redex = open_a(&sig, false);
    let mut group = c.benchmark_group("matching");
    for n in [4usize, 16, 64] {
        let agent = agent(&sig, n);
        group.bench_function(BenchmarkId::new("enumerate", n), |b| {
            b.iter(|| {
                let count = Matcher::new().match_in(black_box(&agent), &redex).unwrap().count();
                black_box(count)
            })
        });
        group.bench_function(BenchmarkId::new("weighted", n), |b| {
            b.iter(|| {
                let best = WeightedMatcher::new(ByChildren, Objective::Maximize)
                    .match_in(black_box(&agent), &redex)
                    .unwrap()
                    .next();
                black_box(best.map(|m| m.weight()))
            })
        });
    }
    group.finish();
}

fn bench_rewriting(c: &mut Criterion) {
    let sig = signature();
    let rule = RewritingRule::with_identity(open_a(&sig, false), open_a(&sig, true)).unwrap();
    let mut group = c.benchmark_group("rewriting");
    group.sample_size(20);
    for n in [4usize, 16] {
        let agent = agent(&sig, n);
        group.bench_function(BenchmarkId::new("apply", n), |b| {
            b.iter(|| {
                let results: Vec<Bigraph> = rule
                    .apply(black_box(&agent))
                    .unwrap()
                    .collect::<BigraphResult<_>>()
                    .unwrap();
                black_box(results.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enumeration, bench_rewriting);
criterion_main!(benches);
