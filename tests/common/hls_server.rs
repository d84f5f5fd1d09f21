//! Minimal HTTP/1.1 server that plays a live HLS stream for integration tests.
//!
//! Serves a master playlist, one media playlist whose window moves forward on
//! every poll until it reaches `final_top`, and segment bodies `seg-<i>;`.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct LiveStreamOptions {
    /// Highest index in the first media playlist response.
    pub initial_top: u64,
    /// The window stops moving here.
    pub final_top: u64,
    /// Segments answered with 404.
    pub missing: HashSet<u64>,
    /// When set, every request must carry this `Cookie` value or get 403.
    pub cookie: Option<String>,
}

pub struct LiveServer {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl LiveServer {
    pub fn master_url(&self) -> String {
        format!("{}live/master.m3u8", self.base)
    }

    pub fn media_url(&self) -> String {
        format!("{}live/720/index.m3u8", self.base)
    }

    /// Requests whose path starts with `path_prefix`.
    pub fn hits(&self, path_prefix: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|p| p.starts_with(path_prefix)).count()
    }
}

pub fn segment_body(i: u64) -> String {
    format!("seg-{i};")
}

pub fn start(opts: LiveStreamOptions) -> LiveServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let opts = Arc::new(opts);
    let polls = Arc::new(AtomicU64::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let opts = Arc::clone(&opts);
            let polls = Arc::clone(&polls);
            let log = Arc::clone(&log);
            thread::spawn(move || handle(stream, &opts, &polls, &log));
        }
    });
    LiveServer { base: format!("http://127.0.0.1:{}/", port), requests }
}

fn master() -> String {
    "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"\n\
360/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720,CODECS=\"avc1.4d401f,mp4a.40.2\"\n\
720/index.m3u8\n"
        .to_string()
}

fn media(top: u64) -> String {
    let first = top.saturating_sub(3);
    let mut s = format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:{first}\n");
    for i in first..=top {
        s.push_str(&format!("#EXTINF:2.000,\nindex_0_{i}.ts?m=1\n"));
    }
    s
}

fn handle(
    mut stream: std::net::TcpStream,
    opts: &LiveStreamOptions,
    polls: &AtomicU64,
    log: &Mutex<Vec<String>>,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
    log.lock().unwrap().push(path.clone());

    if let Some(expected) = &opts.cookie {
        let sent = request
            .lines()
            .find_map(|l| l.split_once(':').filter(|(k, _)| k.eq_ignore_ascii_case("cookie")))
            .map(|(_, v)| v.trim().to_string());
        if sent.as_deref() != Some(expected.as_str()) {
            respond(&mut stream, "403 Forbidden", "");
            return;
        }
    }

    if path == "/live/master.m3u8" {
        respond(&mut stream, "200 OK", &master());
    } else if path == "/live/720/index.m3u8" {
        let n = polls.fetch_add(1, Ordering::SeqCst);
        let top = (opts.initial_top + n).min(opts.final_top);
        respond(&mut stream, "200 OK", &media(top));
    } else if let Some(i) = segment_index(&path) {
        if opts.missing.contains(&i) || i > opts.final_top {
            respond(&mut stream, "404 Not Found", "");
        } else {
            respond(&mut stream, "200 OK", &segment_body(i));
        }
    } else {
        respond(&mut stream, "404 Not Found", "");
    }
}

fn segment_index(path: &str) -> Option<u64> {
    let rest = path.strip_prefix("/live/720/index_0_")?;
    let (digits, _) = rest.split_once(".ts")?;
    digits.parse().ok()
}

fn respond(stream: &mut std::net::TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
