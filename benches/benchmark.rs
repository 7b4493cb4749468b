#[macro_use]
extern crate criterion;

extern crate rand;
extern crate sbrl;

use criterion::Criterion;

use rand::distributions::{Distribution, Uniform};
use rand::prng::XorShiftRng;
use rand::SeedableRng;

use sbrl::config::{LoaderConfig, SessionConfig};
use sbrl::data::{temporal_split, Interaction, Interactions, UserConsumed};
use sbrl::loader::build_dataloader;
use sbrl::session::{build_return_session, build_session};

fn synthetic(num_users: usize, num_items: usize, per_user: usize) -> Interactions {
    let mut rng = XorShiftRng::from_seed([42; 16]);
    let items = Uniform::new(0, num_items);

    let mut interactions = Interactions::new(num_users, num_items);

    for user_id in 0..num_users {
        for timestamp in 0..per_user {
            interactions.push(Interaction::new(user_id, items.sample(&mut rng), timestamp));
        }
    }

    interactions
}

fn split(num_users: usize) -> (UserConsumed, UserConsumed) {
    let consumed = synthetic(num_users, 5000, 50).to_consumed();

    temporal_split(&consumed, 0.2).unwrap()
}

fn bench_sessions(c: &mut Criterion) {
    c.bench_function("build_session", |b| {
        let (train, test) = split(2000);
        let config = SessionConfig::new(2000, 10);

        b.iter(|| build_session(&config, &train, &test, true, None).unwrap())
    });

    c.bench_function("build_return_session", |b| {
        let (train, test) = split(2000);
        let config = SessionConfig::new(2000, 10);

        b.iter(|| build_return_session(&config, &train, &test, true, None).unwrap())
    });
}

fn bench_loader(c: &mut Criterion) {
    c.bench_function("train_epoch", |b| {
        let (train, test) = split(2000);
        let config = LoaderConfig::new(SessionConfig::new(2000, 10), 256).seed(42);
        let (mut loader, _) = build_dataloader(&config, &train, &test, None, None).unwrap();

        b.iter(|| loader.iter_batches().map(|x| x.unwrap().len()).sum::<usize>())
    });
}

criterion_group!{
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_sessions, bench_loader
}
criterion_main!(benches);
