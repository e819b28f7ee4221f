use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use warden_rs::{
    AttributeClause, AttributeSource, ComparisonOp, ConditionSet, Effect, EvaluationContext,
    InMemoryPolicyStore, OwnershipClause, Policy, PolicyEngine, Resource, ResourceField, Subject,
};

/// Build a policy set exercising every clause kind
fn policy_set() -> Vec<Policy> {
    vec![
        Policy::new("read-any", "reads", "form", "read", Effect::Allow),
        Policy::new("own-forms", "owner writes", "form", "*", Effect::Allow)
            .with_priority(100)
            .with_conditions(ConditionSet {
                ownership: Some(OwnershipClause::owner_of("userId")),
                ..ConditionSet::default()
            }),
        Policy::new("no-anon-updates", "deny anonymous", "form", "update", Effect::Deny)
            .with_priority(150)
            .with_conditions(ConditionSet {
                attributes: vec![AttributeClause {
                    source: AttributeSource::Subject,
                    field: "role".to_string(),
                    operator: ComparisonOp::Equals,
                    value: json!("anonymous"),
                }],
                ..ConditionSet::default()
            }),
        Policy::new("quota", "quota deny", "form", "create", Effect::Deny)
            .with_priority(200)
            .with_conditions(ConditionSet {
                custom: Some("user.stats.formCount >= subscription.limits.forms".to_string()),
                ..ConditionSet::default()
            }),
    ]
}

fn update_ctx() -> EvaluationContext {
    EvaluationContext::new(
        Subject::new("u1").with_role("user"),
        Resource::new("form").with_attr("userId", json!("u1")),
        "update",
    )
}

fn bench_evaluate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = PolicyEngine::new(
        Arc::new(InMemoryPolicyStore::with_policies(policy_set())),
        vec![],
    );
    let ctx = update_ctx();

    // Warm the cache so the bench measures evaluation, not store reads
    rt.block_on(engine.evaluate(&ctx)).unwrap();

    let mut group = c.benchmark_group("evaluate");
    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                for _ in 0..count {
                    let result = rt.block_on(engine.evaluate(&ctx)).unwrap();
                    black_box(result.allowed);
                }
            });
        });
    }
    group.finish();
}

fn bench_filter_fields(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = PolicyEngine::new(
        Arc::new(InMemoryPolicyStore::with_policies(vec![Policy::new(
            "read-fields",
            "fields",
            "form:field",
            "read",
            Effect::Allow,
        )])),
        vec![],
    );
    let ctx = EvaluationContext::new(Subject::new("u1"), Resource::new("form"), "read");
    rt.block_on(engine.evaluate(&ctx)).unwrap();

    let fields: Vec<ResourceField> = (0..32)
        .map(|i| ResourceField::new(&format!("field-{}", i)))
        .collect();

    c.bench_function("filter_fields_32", |b| {
        b.iter(|| {
            let kept = rt
                .block_on(engine.filter_fields(&ctx, fields.clone()))
                .unwrap();
            black_box(kept.len());
        });
    });
}

criterion_group!(benches, bench_evaluate, bench_filter_fields);
criterion_main!(benches);
