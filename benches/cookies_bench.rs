use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mimicnet::cookies::CookieJar;
use url::Url;

fn benchmark_cookie_insert(c: &mut Criterion) {
    let jar = CookieJar::new();
    let url = Url::parse("https://example.com").unwrap();

    c.bench_function("cookie_parse_and_store", |b| {
        b.iter(|| {
            jar.set_cookies(black_box(&url), [black_box("foo=bar; Path=/; Secure")]);
        })
    });
}

fn benchmark_cookie_header(c: &mut Criterion) {
    let jar = CookieJar::new();
    let url = Url::parse("https://www.example.com/foo/bar").unwrap();
    // Pre-populate
    let lines: Vec<String> = (0..100)
        .map(|i| format!("cookie{}=val; Domain=example.com; Path=/foo", i))
        .collect();
    jar.set_cookies(&url, &lines);

    c.bench_function("cookie_header_for_url", |b| {
        b.iter(|| black_box(jar.header_value(black_box(&url))))
    });
}

criterion_group!(benches, benchmark_cookie_insert, benchmark_cookie_header);
criterion_main!(benches);
