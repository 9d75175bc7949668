// Criterion benchmarks for the swipe ledger

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pawmatch_swipe::core::{
    decide, fallback_score, normalize_remote, EntitlementPolicy, DEFAULT_AGE_SPAN,
};
use pawmatch_swipe::models::{
    CreditKind, EntitlementRecord, FeatureKind, Intent, PetSize, Profile, RemoteBreakdown,
    RemoteScoreResponse, SubscriptionTier,
};

const TRAITS: [&str; 8] = [
    "playful", "calm", "shy", "energetic", "friendly", "vocal", "curious", "independent",
];

fn create_profile(id: usize, trait_count: usize) -> Profile {
    let size = match id % 5 {
        0 => PetSize::Tiny,
        1 => PetSize::Small,
        2 => PetSize::Medium,
        3 => PetSize::Large,
        _ => PetSize::Giant,
    };
    Profile {
        id: id.to_string(),
        name: format!("Pet {}", id),
        species: if id % 2 == 0 { "dog" } else { "cat" }.to_string(),
        breed: None,
        age_years: 1.0 + (id % 12) as f64,
        size,
        traits: (0..trait_count).map(|i| TRAITS[(id + i) % TRAITS.len()].to_string()).collect(),
        intent: Intent::Playdate,
        is_active: true,
    }
}

fn bench_fallback_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("fallback_score");

    for trait_count in [0, 2, 8].iter() {
        let a = create_profile(1, *trait_count);
        let b = create_profile(4, *trait_count);
        group.bench_with_input(BenchmarkId::new("traits", trait_count), trait_count, |bench, _| {
            bench.iter(|| fallback_score(black_box(&a), black_box(&b), DEFAULT_AGE_SPAN));
        });
    }

    group.finish();
}

fn bench_decide(c: &mut Criterion) {
    let policy = EntitlementPolicy::default();
    let now = Utc::now();
    let mut record = EntitlementRecord::subscribed(SubscriptionTier::Premium, None);
    record.balances.insert(CreditKind::SuperLikes, 3);

    c.bench_function("decide_superlike_balance", |b| {
        b.iter(|| decide(black_box(&record), &policy, FeatureKind::SuperLike, black_box(5), now));
    });
}

fn bench_normalize_remote(c: &mut Criterion) {
    let response = RemoteScoreResponse {
        overall: Some(71.0),
        breakdown: Some(RemoteBreakdown {
            temperament: Some(80.0),
            activity: Some(60.0),
            size: Some(90.0),
            age: Some(70.0),
            interests: Some(65.0),
            lifestyle: Some(67.0),
        }),
        summary: None,
    };

    c.bench_function("normalize_remote", |b| {
        b.iter(|| normalize_remote(black_box(response.clone())));
    });
}

criterion_group!(benches, bench_fallback_score, bench_decide, bench_normalize_remote);

criterion_main!(benches);
