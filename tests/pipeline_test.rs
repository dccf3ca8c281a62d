use std::io::{Cursor, Read};

use bindery::pipeline::{get_epub, spawn_detached_retry};
use bindery::EpubRequest;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipArchive;

fn client() -> reqwest::Client {
    bindery::fetch::new_client().unwrap()
}

fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::ImageBuffer::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 200u8])
    });
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn unzip(data: &[u8]) -> ZipArchive<Cursor<Vec<u8>>> {
    ZipArchive::new(Cursor::new(data.to_vec())).expect("valid zip")
}

fn read_text(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
    let mut file = archive.by_name(name).expect(name);
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    contents
}

fn read_bytes(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
    let mut file = archive.by_name(name).expect(name);
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    contents
}

#[tokio::test]
async fn canonical_article_end_to_end() {
    let server = MockServer::start().await;
    let html = r#"<html lang="en"><head><title>Hello</title></head>
        <body><article><h1>H</h1><p>Body</p><img src="/a.png"></article></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    let png = png_fixture(4, 4);
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png.clone(), "image/png"))
        .mount(&server)
        .await;

    let mut req = EpubRequest::new(format!("{}/x", server.uri()));
    req.min_article_nodes = 0;
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");

    assert_eq!(epub.title, "Hello");
    assert!(!epub.id.is_empty());

    let mut archive = unzip(&epub.data);
    let article = read_text(&mut archive, "content/article.xhtml");
    assert!(article.contains("<h1>H</h1>"));
    assert!(article.contains("<p>Body</p>"));
    assert!(article.contains(r#"<img src="images/001.png"/>"#));

    assert_eq!(read_bytes(&mut archive, "content/images/001.png"), png);

    let opf = read_text(&mut archive, "content/content.opf");
    assert!(opf.contains("<dc:language>en</dc:language>"));
    assert!(opf.contains("<dc:title>Hello</dc:title>"));
    assert!(opf.contains(&epub.id));
}

#[tokio::test]
async fn redirects_update_the_image_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/real/article"))
        .mount(&server)
        .await;
    let html = r#"<html><body><article><p>text</p><img src="pic.png"></article></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/real/article"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    let png = png_fixture(2, 2);
    Mock::given(method("GET"))
        .and(path("/real/pic.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png.clone(), "image/png"))
        .mount(&server)
        .await;

    let mut req = EpubRequest::new(format!("{}/start", server.uri()));
    req.min_article_nodes = 0;
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");

    let mut archive = unzip(&epub.data);
    assert_eq!(read_bytes(&mut archive, "content/images/001.png"), png);
}

#[tokio::test]
async fn redirect_loops_are_capped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let req = EpubRequest::new(format!("{}/loop", server.uri()));
    let err = get_epub(&client(), &req).await.unwrap_err();
    assert!(
        format!("{err:?}").contains("stopped after 10 redirects"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let req = EpubRequest::new(format!("{}/missing", server.uri()));
    let err = get_epub(&client(), &req).await.unwrap_err();
    assert_eq!(err.to_string(), "unexpected status code: 404");
}

#[tokio::test]
async fn amp_version_is_preferred() {
    let server = MockServer::start().await;
    let orig = format!(
        r#"<html><head><link rel="amphtml" href="{}/amp"><title>Orig</title></head>
        <body><p>original content</p></body></html>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/orig"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(orig, "text/html"))
        .mount(&server)
        .await;
    let amp = r#"<html ⚡ lang="en"><head><title>Amp</title></head>
        <body><article><p>amp content</p></article></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/amp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(amp, "text/html"))
        .mount(&server)
        .await;

    let mut req = EpubRequest::new(format!("{}/orig", server.uri()));
    req.min_article_nodes = 0;
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");

    assert_eq!(epub.title, "Amp");
    let mut archive = unzip(&epub.data);
    let article = read_text(&mut archive, "content/article.xhtml");
    assert!(article.contains("amp content"));
    assert!(!article.contains("original content"));
}

#[tokio::test]
async fn amp_fetch_failure_falls_back_to_original() {
    let server = MockServer::start().await;
    let orig = r#"<html><head><link rel="amphtml" href="/amp"><title>Orig</title></head>
        <body><p>original content</p></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/orig"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(orig, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/amp"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let req = EpubRequest::new(format!("{}/orig", server.uri()));
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");
    assert_eq!(epub.title, "Orig");
}

#[tokio::test]
async fn grayscale_and_downscale_end_to_end() {
    let server = MockServer::start().await;
    let html = r#"<html><body><article><p>pic below</p><img src="/big.png"></article></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(png_fixture(1024, 768), "image/png"),
        )
        .mount(&server)
        .await;

    let mut req = EpubRequest::new(format!("{}/x", server.uri()));
    req.min_article_nodes = 0;
    req.grayscale = true;
    req.fit_image = 200;
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");

    let mut archive = unzip(&epub.data);
    let article = read_text(&mut archive, "content/article.xhtml");
    assert!(article.contains(r#"<img src="images/001.jpg"/>"#));

    let jpeg = read_bytes(&mut archive, "content/images/001.jpg");
    assert_eq!(
        image::guess_format(&jpeg).unwrap(),
        image::ImageFormat::Jpeg
    );
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 150));

    let opf = read_text(&mut archive, "content/content.opf");
    assert!(opf.contains(r#"href="images/001.jpg" media-type="image/jpeg""#));
}

#[tokio::test]
async fn missing_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/headless"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html><head><title>T</title></head></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let req = EpubRequest::new(format!("{}/headless", server.uri()));
    let err = get_epub(&client(), &req).await.unwrap_err();
    assert!(err.to_string().contains("no body"));
}

#[tokio::test]
async fn failed_image_downloads_do_not_fail_the_pipeline() {
    let server = MockServer::start().await;
    let html = r#"<html><body><article><p>text</p><img src="/gone.png"></article></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut req = EpubRequest::new(format!("{}/x", server.uri()));
    req.min_article_nodes = 0;
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");

    let mut archive = unzip(&epub.data);
    assert!(read_bytes(&mut archive, "content/images/001.png").is_empty());
    let opf = read_text(&mut archive, "content/content.opf");
    assert!(opf.contains(r#"href="images/001.png" media-type="application/octet-stream""#));
}

#[tokio::test]
async fn configured_user_agent_is_sent_for_page_and_images() {
    let server = MockServer::start().await;
    let html = r#"<html><body><article><p>text</p><img src="/pic.png"></article></body></html>"#;
    // These mocks only match when the request carries the configured UA.
    Mock::given(method("GET"))
        .and(path("/x"))
        .and(header("user-agent", "custom-agent/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pic.png"))
        .and(header("user-agent", "custom-agent/1.0"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(png_fixture(2, 2), "image/png"),
        )
        .mount(&server)
        .await;

    let mut req = EpubRequest::new(format!("{}/x", server.uri()));
    req.min_article_nodes = 0;
    req.user_agent = "custom-agent/1.0".to_string();
    let epub = get_epub(&client(), &req).await.expect("pipeline succeeds");

    let mut archive = unzip(&epub.data);
    assert!(!read_bytes(&mut archive, "content/images/001.png").is_empty());
}

#[tokio::test]
async fn detached_retry_delivers_on_the_side_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let html = r#"<html><head><title>Archived</title></head>
        <body><article><p>rescued content</p></article></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/archived"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;

    let client = client();
    let mut req = EpubRequest::new(format!("{}/broken", server.uri()));
    req.min_article_nodes = 0;
    let err = get_epub(&client, &req).await.unwrap_err();
    assert!(!matches!(err, bindery::Error::UnsupportedUrl(_)));

    // A bot-style caller would compute archive_fallback_url here; the retry
    // target is a mock standing in for the archive copy.
    let mut retry = req.clone();
    retry.url = format!("{}/archived", server.uri());
    let rx = spawn_detached_retry(client, retry);
    let epub = rx.await.expect("task completes").expect("retry succeeds");
    assert_eq!(epub.title, "Archived");
}
