//! A minimal CardDAV server, that keeps a single address book in memory.
//!
//! It understands just enough of WebDAV for the client of this crate: PROPFIND, REPORT, GET, conditional PUT and DELETE,
//! all of them behind HTTP Basic authentication.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::routing::any;
use axum::Router;
use base64::Engine;

use carddav_contacts::Settings;

pub const COLLECTION_PATH: &str = "/addressbooks/john/contacts/";
pub const USERNAME: &str = "john";
pub const PASSWORD: &str = "secret";


/// A request, as received by the server
#[derive(Clone, Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

type Reply = (StatusCode, HeaderMap, String);

fn empty(status: StatusCode) -> Reply {
    (status, HeaderMap::new(), String::new())
}

fn with_etag(mut reply: Reply, version: u64) -> Reply {
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", version)) {
        reply.1.insert(header::ETAG, value);
    }
    reply
}

fn multistatus(body: String) -> Reply {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml; charset=utf-8"));
    (StatusCode::MULTI_STATUS, headers, body)
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}


#[derive(Default)]
struct ServerState {
    /// Resource name -> (body, version)
    entries: BTreeMap<String, (String, u64)>,
    last_version: u64,
    requests: Vec<Request>,
    report_unsupported: bool,
}

impl ServerState {
    fn store(&mut self, name: &str, body: String) -> u64 {
        self.last_version += 1;
        self.entries.insert(name.to_string(), (body, self.last_version));
        self.last_version
    }

    fn handle(&mut self, method: &Method, request: Request) -> Reply {
        let reply = self.route(method, &request);
        self.requests.push(request);
        reply
    }

    fn route(&mut self, method: &Method, request: &Request) -> Reply {
        let expected_auth = format!("Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", USERNAME, PASSWORD)));
        if request.headers.get("authorization") != Some(&expected_auth) {
            let mut reply = empty(StatusCode::UNAUTHORIZED);
            reply.1.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"contacts\""));
            return reply;
        }

        let name = match request.path.strip_prefix(COLLECTION_PATH) {
            None => return empty(StatusCode::NOT_FOUND),
            Some(name) => name.to_string(),
        };

        let propfind = Method::from_bytes(b"PROPFIND").unwrap();
        let report = Method::from_bytes(b"REPORT").unwrap();
        match (method, name.is_empty()) {
            (m, true) if *m == propfind => self.propfind(request),
            (m, true) if *m == report => self.report(),
            (&Method::GET, false) => self.get(&name),
            (&Method::PUT, false) => self.put(&name, request),
            (&Method::DELETE, false) => self.delete(&name),
            _ => empty(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn propfind(&self, request: &Request) -> Reply {
        let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><d:multistatus xmlns:d="DAV:">"#);
        body.push_str(&format!(
            "<d:response><d:href>{}</d:href><d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
            COLLECTION_PATH));

        if request.headers.get("depth").map(String::as_str) == Some("1") {
            for (name, (_, version)) in &self.entries {
                body.push_str(&format!(
                    "<d:response><d:href>{}{}</d:href><d:propstat><d:prop><d:getetag>\"{}\"</d:getetag></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
                    COLLECTION_PATH, name, version));
            }
        }
        body.push_str("</d:multistatus>");
        multistatus(body)
    }

    fn report(&self) -> Reply {
        if self.report_unsupported {
            return empty(StatusCode::NOT_IMPLEMENTED);
        }

        let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">"#);
        for (name, (vcard, version)) in &self.entries {
            if name.ends_with(".vcf") == false {
                continue;
            }
            body.push_str(&format!(
                "<d:response><d:href>{}{}</d:href><d:propstat><d:prop><d:getetag>\"{}\"</d:getetag><card:address-data>{}</card:address-data></d:prop><d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
                COLLECTION_PATH, name, version, xml_escape(vcard)));
        }
        body.push_str("</d:multistatus>");
        multistatus(body)
    }

    fn get(&self, name: &str) -> Reply {
        match self.entries.get(name) {
            None => empty(StatusCode::NOT_FOUND),
            Some((body, version)) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/vcard; charset=utf-8"));
                with_etag((StatusCode::OK, headers, body.clone()), *version)
            },
        }
    }

    fn put(&mut self, name: &str, request: &Request) -> Reply {
        let current = self.entries.get(name).map(|(_, version)| *version);

        if request.headers.get("if-none-match").map(String::as_str) == Some("*") && current.is_some() {
            return empty(StatusCode::PRECONDITION_FAILED);
        }
        if let Some(expected) = request.headers.get("if-match") {
            let expected = expected.trim_matches('"');
            match current {
                Some(version) if version.to_string() == expected => (),
                _ => return empty(StatusCode::PRECONDITION_FAILED),
            }
        }

        let version = self.store(name, request.body.clone());
        let status = if current.is_some() { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
        with_etag(empty(status), version)
    }

    fn delete(&mut self, name: &str) -> Reply {
        match self.entries.remove(name) {
            None => empty(StatusCode::NOT_FOUND),
            Some(_) => empty(StatusCode::NO_CONTENT),
        }
    }
}


/// A running fake server. It is stopped when the test runtime shuts down
pub struct FakeServer {
    base_url: String,
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let state = Arc::new(Mutex::new(ServerState::default()));
        let app = Router::new()
            .route("/*path", any(handle))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                log::warn!("Fake server: {}", err);
            }
        });

        Self { base_url: format!("http://{}", address), state }
    }

    /// The URL of the address book
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, COLLECTION_PATH)
    }

    pub fn settings(&self) -> Settings {
        Settings::new(self.url(), USERNAME, PASSWORD).unwrap()
    }

    /// Store a resource, as if another client did it. Returns its new entity tag
    pub fn insert(&self, name: &str, body: &str) -> String {
        let version = self.state.lock().unwrap().store(name, body.to_string());
        format!("\"{}\"", version)
    }

    pub fn body_of(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().entries.get(name).map(|(body, _)| body.clone())
    }

    pub fn tag_of(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().entries.get(name).map(|(_, version)| format!("\"{}\"", version))
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().entries.keys().cloned().collect()
    }

    pub fn disable_report(&self) {
        self.state.lock().unwrap().report_unsupported = true;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().requests.clone()
    }

    /// How many requests with this method have been received
    pub fn count(&self, method: &str) -> usize {
        self.state.lock().unwrap().requests.iter().filter(|r| r.method == method).count()
    }
}

async fn handle(
    State(state): State<Arc<Mutex<ServerState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Reply {
    let headers = headers.iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let request = Request { method: method.as_str().to_string(), path: uri.path().to_string(), headers, body };
    state.lock().unwrap().handle(&method, request)
}

/// A vCard, as another client would have written it
pub fn vcard(uid: &str, full_name: &str, family: &str, given: &str) -> String {
    format!("BEGIN:VCARD\r\nVERSION:3.0\r\nFN:{}\r\nN:{};{};;;\r\nEMAIL:{}@example.com\r\nUID:{}\r\nEND:VCARD\r\n",
        full_name, family, given, given.to_lowercase(), uid)
}
