//! Development HTTP server.
//!
//! | Path | Served from |
//! |---|---|
//! | `/__pagesmith/client.js` | the live-reload client |
//! | `/__pagesmith/reload?since=N` | long-poll on the [`LiveReload`] hub |
//! | `/node_modules/...` | the project's `node_modules` directory |
//! | anything else | first match in `temp`, `dist`, `public`, then `src` |
//!
//! Directories resolve to their `index.html`. HTML responses get the reload
//! client injected before `</body>`. Paths with `..` segments are refused.
//!
//! Each request is answered on its own thread so long-polls never hold up
//! file requests.

use crate::config::{Layout, ServeConfig};
use crate::reload::{self, LiveReload};
use maud::{DOCTYPE, Markup, html};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server};

/// How long a reload poll waits before answering with "nothing new".
const POLL_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("cannot listen on {addr}: {message}")]
    Bind { addr: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered static roots plus the `/node_modules` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeRoots {
    pub roots: Vec<PathBuf>,
    pub node_modules: PathBuf,
}

impl ServeRoots {
    pub fn from_layout(layout: &Layout) -> Self {
        Self {
            roots: vec![
                layout.temp.clone(),
                layout.dist.clone(),
                layout.public.clone(),
                layout.src.clone(),
            ],
            node_modules: layout.node_modules.clone(),
        }
    }

    /// Map a URL path to a file on disk.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let decoded = percent_decode(url_path)?;
        let segments: Vec<&str> = decoded
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if segments.iter().any(|s| *s == ".." || s.contains('\\')) {
            return None;
        }

        let (bases, rest): (Vec<&Path>, &[&str]) = match segments.split_first() {
            Some((&"node_modules", rest)) => (vec![self.node_modules.as_path()], rest),
            _ => (self.roots.iter().map(PathBuf::as_path).collect(), &segments[..]),
        };
        bases.into_iter().find_map(|base| {
            let candidate = rest.iter().fold(base.to_path_buf(), |p, s| p.join(s));
            if candidate.is_dir() {
                let index = candidate.join("index.html");
                index.is_file().then_some(index)
            } else {
                candidate.is_file().then_some(candidate)
            }
        })
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` escapes. `None` for malformed escapes or non-UTF-8 results.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            out.push(hi * 16 + lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// What the server does with one request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Client,
    /// `since` is absent on a client's first poll.
    Reload { since: Option<u64> },
    File(PathBuf),
    NotFound(String),
}

/// Classify a request URL (path plus optional query).
pub fn route(roots: &ServeRoots, url: &str) -> Route {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    if path == reload::CLIENT_PATH {
        return Route::Client;
    }
    if path == reload::RELOAD_PATH {
        let since = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "since")
            .and_then(|(_, v)| v.parse().ok());
        return Route::Reload { since };
    }
    match roots.resolve(path) {
        Some(file) => Route::File(file),
        None => Route::NotFound(path.to_string()),
    }
}

/// The page shown for unknown paths.
pub fn not_found_page(path: &str, roots: &ServeRoots) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { "404 Not Found" }
            }
            body {
                h1 { "Not found" }
                p { code { (path) } " is not in any served directory:" }
                ul {
                    @for root in &roots.roots {
                        li { code { (root.display().to_string()) } }
                    }
                    li { code { (roots.node_modules.display().to_string()) } " (as /node_modules)" }
                }
            }
        }
    }
}

fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT || mime.subtype() == mime_guess::mime::JAVASCRIPT {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn respond(request: Request, status: u16, content_type: &str, body: Vec<u8>) {
    let mut response = Response::from_data(body).with_status_code(status);
    for h in [
        header("Content-Type", content_type),
        header("Cache-Control", "no-store"),
    ]
    .into_iter()
    .flatten()
    {
        response.add_header(h);
    }
    if let Err(error) = request.respond(response) {
        tracing::debug!(%error, "client went away");
    }
}

/// Body bytes and content type for a file, with the reload client injected into HTML.
pub fn file_body(path: &Path) -> std::io::Result<(Vec<u8>, String)> {
    let bytes = fs::read(path)?;
    let content_type = content_type(path);
    if content_type.starts_with("text/html") {
        let html = String::from_utf8_lossy(&bytes);
        return Ok((reload::inject_client(&html).into_bytes(), content_type));
    }
    Ok((bytes, content_type))
}

pub struct DevServer {
    server: Server,
    roots: ServeRoots,
    hub: Arc<LiveReload>,
}

impl DevServer {
    pub fn bind(config: &ServeConfig, layout: &Layout, hub: Arc<LiveReload>) -> Result<Self, ServeError> {
        let addr = config.address();
        let server = Server::http(&addr).map_err(|e| ServeError::Bind {
            addr: addr.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            server,
            roots: ServeRoots::from_layout(layout),
            hub,
        })
    }

    /// The bound address, useful when binding port 0.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve requests until the listener shuts down. Blocks.
    pub fn run(self) {
        let roots = Arc::new(self.roots);
        for request in self.server.incoming_requests() {
            let roots = Arc::clone(&roots);
            let hub = Arc::clone(&self.hub);
            std::thread::spawn(move || handle(request, &roots, &hub));
        }
    }
}

fn handle(request: Request, roots: &ServeRoots, hub: &LiveReload) {
    let url = request.url().to_string();
    match route(roots, &url) {
        Route::Client => respond(
            request,
            200,
            "text/javascript; charset=utf-8",
            reload::CLIENT_SCRIPT.as_bytes().to_vec(),
        ),
        Route::Reload { since } => {
            let notice = match since {
                Some(since) => hub.wait_since(since, POLL_TIMEOUT),
                None => hub.wait_since(hub.generation(), Duration::ZERO),
            };
            match serde_json::to_vec(&notice) {
                Ok(body) => respond(request, 200, "application/json", body),
                Err(error) => respond(request, 500, "text/plain", error.to_string().into_bytes()),
            }
        }
        Route::File(path) => match file_body(&path) {
            Ok((body, content_type)) => {
                tracing::debug!(url = %url, file = %path.display(), "200");
                respond(request, 200, &content_type, body)
            }
            Err(error) => respond(request, 500, "text/plain", error.to_string().into_bytes()),
        },
        Route::NotFound(path) => {
            tracing::debug!(url = %url, "404");
            let page = not_found_page(&path, roots).into_string();
            respond(request, 404, "text/html; charset=utf-8", page.into_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    fn roots(root: &Path) -> ServeRoots {
        ServeRoots::from_layout(&ProjectConfig::default().layout(root))
    }

    #[test]
    fn first_root_wins() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "temp/index.html", "temp");
        write_file(tmp.path(), "dist/index.html", "dist");
        write_file(tmp.path(), "public/robots.txt", "public");

        let r = roots(tmp.path());
        assert_eq!(r.resolve("/"), Some(tmp.path().join("temp/index.html")));
        assert_eq!(r.resolve("/index.html"), Some(tmp.path().join("temp/index.html")));
        assert_eq!(r.resolve("/robots.txt"), Some(tmp.path().join("public/robots.txt")));
    }

    #[test]
    fn images_fall_back_to_the_source_tree() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "src/assets/images/logo.svg", "<svg/>");
        assert_eq!(
            roots(tmp.path()).resolve("/assets/images/logo.svg"),
            Some(tmp.path().join("src/assets/images/logo.svg"))
        );
    }

    #[test]
    fn node_modules_route_is_mounted() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "node_modules/lib/dist/lib.js", "x");
        assert_eq!(
            roots(tmp.path()).resolve("/node_modules/lib/dist/lib.js"),
            Some(tmp.path().join("node_modules/lib/dist/lib.js"))
        );
    }

    #[test]
    fn traversal_is_refused() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "secret.txt", "x");
        write_file(tmp.path(), "temp/a.html", "x");
        let r = roots(tmp.path());
        assert_eq!(r.resolve("/../secret.txt"), None);
        assert_eq!(r.resolve("/%2e%2e/secret.txt"), None);
        assert_eq!(r.resolve("/node_modules/../secret.txt"), None);
    }

    #[test]
    fn percent_escapes_are_decoded() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "public/my file.txt", "x");
        assert_eq!(
            roots(tmp.path()).resolve("/my%20file.txt"),
            Some(tmp.path().join("public/my file.txt"))
        );
        assert_eq!(percent_decode("%zz"), None);
    }

    #[test]
    fn routes_reload_endpoints_and_queries() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "temp/index.html", "x");
        let r = roots(tmp.path());
        assert_eq!(route(&r, "/__pagesmith/client.js"), Route::Client);
        assert_eq!(
            route(&r, "/__pagesmith/reload?since=4"),
            Route::Reload { since: Some(4) }
        );
        assert_eq!(route(&r, "/__pagesmith/reload"), Route::Reload { since: None });
        assert_eq!(
            route(&r, "/index.html?v=2"),
            Route::File(tmp.path().join("temp/index.html"))
        );
        assert_eq!(route(&r, "/missing.css"), Route::NotFound("/missing.css".into()));
    }

    #[test]
    fn html_gets_the_client_and_other_files_do_not() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "temp/index.html", "<body></body>");
        write_file(tmp.path(), "temp/a.css", "a{}");

        let (html, html_type) = file_body(&tmp.path().join("temp/index.html")).unwrap();
        assert_eq!(html_type, "text/html; charset=utf-8");
        assert!(String::from_utf8(html).unwrap().contains(reload::CLIENT_PATH));

        let (css, css_type) = file_body(&tmp.path().join("temp/a.css")).unwrap();
        assert_eq!(css_type, "text/css; charset=utf-8");
        assert_eq!(css, b"a{}");
    }

    #[test]
    fn not_found_page_lists_roots() {
        let tmp = TempDir::new().unwrap();
        let page = not_found_page("/nope", &roots(tmp.path())).into_string();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("/nope"));
        assert!(page.contains("node_modules"));
    }

    #[test]
    fn binds_an_ephemeral_port() {
        let tmp = TempDir::new().unwrap();
        let config = ServeConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        let layout = ProjectConfig::default().layout(tmp.path());
        let server = DevServer::bind(&config, &layout, Arc::new(LiveReload::new())).unwrap();
        assert!(server.local_addr().is_some_and(|a| a.port() != 0));
    }
}
