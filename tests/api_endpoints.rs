//! HTTP API integration tests.
//!
//! Each test spins up a real server on an ephemeral loopback port and talks
//! to it over raw TCP, the same way an external client would.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use dicecam::api::{ApiConfig, ApiServer, NumberSource};
use dicecam::{FrameFeed, SharedNumber};

struct TestApi {
    handle: Option<dicecam::api::ApiHandle>,
}

impl TestApi {
    fn spawn(numbers: NumberSource, video: Option<FrameFeed>) -> Self {
        let cfg = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let handle = ApiServer::new(cfg, numbers, video).spawn().unwrap();
        Self {
            handle: Some(handle),
        }
    }

    fn get(&self, path: &str) -> String {
        let addr = self.handle.as_ref().unwrap().addr;
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        read_response(&mut stream)
    }

    fn request(&self, method: &str, path: &str) -> String {
        let addr = self.handle.as_ref().unwrap().addr;
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
        read_response(&mut stream)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
        }
    }
}

fn read_response(stream: &mut TcpStream) -> String {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                // Responses here carry Content-Length and close promptly;
                // stop once the body after the header separator arrives.
                if let Some(pos) = find_header_end(&data) {
                    let headers = String::from_utf8_lossy(&data[..pos]);
                    if let Some(len) = content_length(&headers) {
                        if data.len() >= pos + 4 + len {
                            break;
                        }
                    }
                }
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(headers: &str) -> Option<usize> {
    headers
        .lines()
        .find_map(|line| line.to_lowercase().strip_prefix("content-length:").map(str::to_string))
        .and_then(|v| v.trim().parse().ok())
}

#[test]
fn current_number_starts_at_minus_one() {
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), None);
    let response = api.get("/get-current-number");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#"{"current_number":-1}"#));
}

#[test]
fn current_number_reflects_the_shared_cell() {
    let shared = SharedNumber::new();
    let api = TestApi::spawn(NumberSource::Shared(shared.clone()), None);

    shared.set(Some(4));
    let response = api.get("/get-current-number");
    assert!(response.contains(r#"{"current_number":4}"#));

    shared.set(None);
    let response = api.get("/get-current-number");
    assert!(response.contains(r#"{"current_number":-1}"#));
}

#[test]
fn get_score_is_an_alias() {
    let shared = SharedNumber::new();
    let api = TestApi::spawn(NumberSource::Shared(shared.clone()), None);

    shared.set(Some(6));
    let number = api.get("/get-current-number");
    let score = api.get("/get-score");
    assert!(number.contains(r#"{"current_number":6}"#));
    assert!(score.contains(r#"{"current_number":6}"#));
}

#[test]
fn health_endpoint_reports_ok() {
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), None);
    let response = api.get("/health");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#"{"status":"ok"}"#));
}

#[test]
fn unknown_path_is_404() {
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), None);
    let response = api.get("/roll-history");
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert!(response.contains("not_found"));
}

#[test]
fn non_get_method_is_405() {
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), None);
    let response = api.request("POST", "/get-current-number");
    assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed"));
}

#[test]
fn query_string_is_ignored_in_routing() {
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), None);
    let response = api.get("/get-current-number?cache=no");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains(r#"{"current_number":-1}"#));
}

#[test]
fn mirror_mode_serves_the_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("current_number.txt");
    let api = TestApi::spawn(NumberSource::Mirror(path.clone()), None);

    // No file yet.
    let response = api.get("/get-current-number");
    assert!(response.contains(r#"{"current_number":-1}"#));

    std::fs::write(&path, "2").unwrap();
    let response = api.get("/get-current-number");
    assert!(response.contains(r#"{"current_number":2}"#));

    std::fs::remove_file(&path).unwrap();
    let response = api.get("/get-current-number");
    assert!(response.contains(r#"{"current_number":-1}"#));
}

#[test]
fn video_is_404_without_a_feed() {
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), None);
    let response = api.get("/video");
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert!(response.contains("video_unavailable"));
}

#[test]
fn video_streams_multipart_frames() {
    let feed = FrameFeed::new();
    let api = TestApi::spawn(NumberSource::Shared(SharedNumber::new()), Some(feed.clone()));

    let addr = api.handle.as_ref().unwrap().addr;
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(stream, "GET /video HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();

    // Keep the feed alive from another thread until the client saw a part.
    let publisher = {
        let feed = feed.clone();
        std::thread::spawn(move || {
            for _ in 0..20 {
                feed.publish(vec![0xFF, 0xD8, 0xAB, 0xFF, 0xD9]);
                std::thread::sleep(Duration::from_millis(20));
            }
        })
    };

    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    while data.len() < 4096 {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&data);
                if text.matches("--frame\r\n").count() >= 2 {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    publisher.join().unwrap();

    let text = String::from_utf8_lossy(&data);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.matches("--frame\r\nContent-Type: image/jpeg\r\n\r\n").count() >= 1);

    // A streaming consumer going away must not break query endpoints.
    drop(stream);
    let response = api.get("/get-current-number");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
}
