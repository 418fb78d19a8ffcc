//! Cache fingerprint cost for small and long conversations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use llm_gateway::cache::fingerprint;
use llm_gateway::{ChatRequest, Message};

fn conversation(turns: usize) -> ChatRequest {
    let mut messages = vec![Message::system("You are a terse assistant.")];
    for i in 0..turns {
        messages.push(Message::user(format!("Question {} about the quarterly numbers?", i)));
        messages.push(Message::assistant(format!("Answer {}: revenue grew four percent.", i)));
    }
    let mut request = ChatRequest::new("gpt-4o-mini", messages);
    request.temperature = Some(0.0);
    request.max_tokens = Some(256);
    request
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for turns in [1usize, 10, 100] {
        let request = conversation(turns);
        group.bench_with_input(BenchmarkId::from_parameter(turns), &request, |b, req| {
            b.iter(|| fingerprint(black_box(req)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint);
criterion_main!(benches);
