//! In-memory transport for unit tests.

use std::cell::RefCell;

use url::Url;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError};

pub(crate) const BASE_URL: &str = "http://localhost:8080/rest";

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError>>;

/// Answers every request with `handler` and records what was sent.
pub(crate) struct FakeTransport {
    handler: Handler,
    requests: RefCell<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    /// Requests whose path (after the base URL) starts with `prefix`.
    pub(crate) fn requests_to(&self, method: HttpMethod, prefix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && path_of(r).starts_with(prefix))
            .collect()
    }
}

impl Transport for FakeTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        (self.handler)(request)
    }
}

pub(crate) fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub(crate) fn login_ok() -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: vec![(
            "Set-Cookie".to_string(),
            "JSESSIONID=abc123; Path=/rest; HttpOnly".to_string(),
        )],
        body: String::new(),
    }
}

/// Path of the request relative to `BASE_URL`, without the query string.
pub(crate) fn path_of(request: &HttpRequest) -> String {
    let rest = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url);
    rest.split('?').next().unwrap_or_default().to_string()
}

pub(crate) fn query_param(request: &HttpRequest, name: &str) -> Option<String> {
    Url::parse(&request.url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// A JSON array of `count` item records numbered from `first`.
pub(crate) fn item_page(first: usize, count: usize) -> String {
    let records: Vec<serde_json::Value> = (first..first + count)
        .map(|n| {
            serde_json::json!({
                "uuid": format!("item-{n}"),
                "name": format!("Item {n}"),
                "handle": format!("123456789/{n}"),
                "type": "item",
                "lastModified": "2015-01-12 15:44:12.978",
                "archived": "true",
                "withdrawn": "false"
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string()
}

/// Serve `total` items honouring `offset`/`limit`, plus login and logout.
pub(crate) fn paged_repository(total: usize) -> FakeTransport {
    FakeTransport::new(move |req| {
        let path = path_of(req);
        match (req.method, path.as_str()) {
            (HttpMethod::Post, "/login") => Ok(login_ok()),
            (HttpMethod::Post, "/logout") => Ok(response(200, "")),
            (HttpMethod::Get, "/items") => {
                let offset: usize = query_param(req, "offset").unwrap().parse().unwrap();
                let limit: usize = query_param(req, "limit").unwrap().parse().unwrap();
                let first = offset.min(total);
                let count = limit.min(total - first);
                Ok(response(200, &item_page(first, count)))
            }
            (HttpMethod::Get, p) if p.starts_with("/items/") && p.ends_with("/metadata") => Ok(
                response(200, r#"[{"key":"dc.title","value":"T","language":"en"}]"#),
            ),
            _ => Ok(response(404, "not found")),
        }
    })
}
