//! Benchmarks for packing and unpacking conversations.

use convoflow::conversation::ConversationId;
use convoflow::store::ContextPacker;
use convoflow::testing::{fixture_registry, Address, CheckoutContext};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sample_state() -> CheckoutContext {
    let mut state = CheckoutContext::with_action(ConversationId::new(), "Checkout");
    state.cart = (0..10).map(|i| format!("item-{i}")).collect();
    let data = state.base.data_mut();
    for i in 0..20_i64 {
        let _ = data.set(format!("counter_{i}"), i);
    }
    let _ = data.set("ship_to", Address::new("Lisbon", "1100"));
    let _ = data.set("note", "leave at the door".to_string());
    state
}

fn packing_benchmark(c: &mut Criterion) {
    let Ok(registry) = fixture_registry() else {
        return;
    };
    let packer = ContextPacker::new(registry);
    let state = sample_state();
    let Ok(row) = packer.pack(&state) else {
        return;
    };

    c.bench_function("pack_checkout", |b| {
        b.iter(|| black_box(packer.pack(black_box(&state)).is_ok()));
    });

    c.bench_function("unpack_checkout", |b| {
        b.iter(|| black_box(packer.unpack(black_box(&row)).is_ok()));
    });

    c.bench_function("typed_get", |b| {
        b.iter(|| black_box(state.base.data().get::<Address>(black_box("ship_to")).is_ok()));
    });
}

criterion_group!(benches, packing_benchmark);
criterion_main!(benches);
