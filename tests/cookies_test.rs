//! Cookie jar behavior through the client.

mod common;

use common::{h1_server, header_value};
use mimicnet::cookies::CookieJar;
use mimicnet::{Client, CookieSpec};
use url::Url;

#[tokio::test]
async fn test_set_cookie_sent_back() {
    let (addr, mut heads) = h1_server(
        b"HTTP/1.1 200 OK\r\nSet-Cookie: sid=abc; Path=/\r\nSet-Cookie: theme=dark; Path=/app\r\nContent-Length: 0\r\n\r\n",
    )
    .await;
    let client = Client::builder().build().unwrap();
    let base = format!("http://{}", addr);

    let resp = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(resp.cookies().len(), 2);
    assert_eq!(resp.request_cookies(), "");
    assert!(header_value(&heads.recv().await.unwrap(), "cookie").is_none());

    let resp = client.get(format!("{}/app/x", base)).send().await.unwrap();
    assert_eq!(resp.request_cookies(), "theme=dark; sid=abc");
    assert_eq!(
        header_value(&heads.recv().await.unwrap(), "cookie"),
        Some("theme=dark; sid=abc")
    );

    client.get(format!("{}/", base)).cookie("extra", "1").send().await.unwrap();
    assert_eq!(
        header_value(&heads.recv().await.unwrap(), "cookie"),
        Some("sid=abc; extra=1")
    );
}

#[tokio::test]
async fn test_manual_cookie_header_kept_first() {
    let (addr, mut heads) = h1_server(b"HTTP/1.1 204 No Content\r\n\r\n").await;
    let client = Client::builder().build().unwrap();
    let url = format!("http://{}/", addr);
    client.set_cookie_value(&url, "jar", "1", None).unwrap();

    client.get(&url).header("Cookie", "manual=0").send().await.unwrap();
    assert_eq!(
        header_value(&heads.recv().await.unwrap(), "cookie"),
        Some("manual=0; jar=1")
    );
}

#[test]
fn test_public_suffix_domain_rejected() {
    let jar = CookieJar::new();
    let url = Url::parse("https://www.example.co.uk/").unwrap();
    let accepted = jar.set_cookies(
        &url,
        [
            "a=1; Domain=co.uk",
            "b=2; Domain=example.co.uk",
            "c=3; Domain=other.co.uk",
        ],
    );
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].name, "b");
    assert!(!accepted[0].host_only);

    let sibling = Url::parse("https://shop.example.co.uk/").unwrap();
    assert_eq!(jar.header_value(&sibling), "b=2");
}

#[test]
fn test_secure_cookie_not_sent_over_http() {
    let jar = CookieJar::new();
    let url = Url::parse("https://example.com/").unwrap();
    jar.set_cookies(&url, ["s=1; Secure", "p=2"]);

    assert_eq!(jar.header_value(&url), "s=1; p=2");
    assert_eq!(jar.header_value(&Url::parse("http://example.com/").unwrap()), "p=2");
}

#[test]
fn test_max_age_zero_deletes() {
    let jar = CookieJar::new();
    let url = Url::parse("https://example.com/").unwrap();
    jar.set_cookies(&url, ["gone=1"]);
    assert_eq!(jar.len(), 1);
    jar.set_cookies(&url, ["gone=1; Max-Age=0"]);
    assert!(jar.header_value(&url).is_empty());
}

#[test]
fn test_client_cookie_helpers() {
    let client = Client::builder().build().unwrap();
    client
        .set_custom_cookie(
            "https://example.com/",
            CookieSpec {
                domain: Some("example.com".into()),
                secure: true,
                http_only: true,
                ..CookieSpec::new("token", "t0k")
            },
        )
        .unwrap();

    let cookies = client.cookies("https://api.example.com/").unwrap();
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].secure && cookies[0].http_only && !cookies[0].host_only);
    assert!(client.cookies("http://api.example.com/").unwrap().is_empty());

    assert_eq!(client.remove_cookie("https://api.example.com/", "token").unwrap(), 1);
    assert!(client.cookies_map("https://example.com/").unwrap().is_empty());
}
