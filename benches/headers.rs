use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mimicnet::http::orderedheaders::{resolve_order, HeaderList};

fn chrome_headers() -> HeaderList {
    let mut headers = HeaderList::new();
    headers.add(
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"
    ).unwrap();
    headers.add("Accept-Encoding", "gzip, deflate, br").unwrap();
    headers.add("Accept-Language", "en-GB,en;q=0.9").unwrap();
    headers.add("Cache-Control", "max-age=0").unwrap();
    headers.add(
        "Cookie",
        "WMF-Last-Access=xxxxxxxxxxx; WMF-Last-Access-Global=xxxxxxxxxxx; GeoIP=xxxxxxxxxxxxxxxxxxxxxxxxxxx; NetworkLimit=0.001"
    ).unwrap();
    headers
        .add(
            "Sec-Ch-Ua",
            "\"Google Chrome\";v=\"120\", \"Not;A=Brand\";v=\"8\", \"Chromium\";v=\"120\"",
        )
        .unwrap();
    headers.add("Sec-Ch-Ua-Mobile", "?0").unwrap();
    headers.add("Sec-Ch-Ua-Platform", "\"Linux\"").unwrap();
    headers.add("Sec-Fetch-Dest", "document").unwrap();
    headers.add("Sec-Fetch-Mode", "navigate").unwrap();
    headers.add("Sec-Fetch-Site", "none").unwrap();
    headers.add("Sec-Fetch-User", "?1").unwrap();
    headers.add("Upgrade-Insecure-Requests", "1").unwrap();
    headers.add(
        "User-Agent",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    ).unwrap();
    headers.add("X-Requested-With", "bench").unwrap();
    headers
}

fn benchmark_headers_ordered(c: &mut Criterion) {
    let headers = chrome_headers();
    let order = resolve_order(None, None, None);

    // Per-request cost of laying headers out for the wire
    c.bench_function("headers_ordered", |b| {
        b.iter(|| black_box(&headers).ordered(black_box(&order)))
    });
}

fn benchmark_headers_add(c: &mut Criterion) {
    c.bench_function("headers_add", |b| {
        b.iter(|| {
            let mut headers = HeaderList::new();
            headers.add("Accept", "text/html").unwrap();
            headers.add("User-Agent", "Mozilla/5.0").unwrap();
            headers.add("Connection", "keep-alive").unwrap();
            headers.set("Accept", "*/*").unwrap();
            black_box(headers)
        })
    });
}

criterion_group!(benches, benchmark_headers_ordered, benchmark_headers_add);
criterion_main!(benches);
