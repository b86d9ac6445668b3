//! Request/response data exposed to expressions.

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde_json::{Map, Value};

/// The inbound request as seen by transforms and metering.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    /// Parameters extracted by the route match.
    pub params: BTreeMap<String, String>,
    pub headers: HeaderMap,
    /// Query pairs in request order.
    pub query: Vec<(String, String)>,
    pub body: Bytes,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Split a raw `a=1&b=2` query string into decoded pairs.
    pub fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
        raw.map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn with_query(mut self, raw: Option<&str>) -> Self {
        self.query = Self::parse_query(raw);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The upstream response as seen by response transforms and metering.
#[derive(Debug, Clone, Default)]
pub struct ResponseContext {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Variables in scope for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    vars: Map<String, Value>,
}

impl EvalContext {
    /// Variables available for request-side expressions.
    pub fn request(req: &RequestContext) -> Self {
        let mut vars = Map::new();
        vars.insert("method".into(), Value::String(req.method.clone()));
        vars.insert("path".into(), Value::String(req.path.clone()));
        vars.insert(
            "params".into(),
            Value::Object(
                req.params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        );
        vars.insert("headers".into(), headers_to_json(&req.headers));

        let mut query = Map::new();
        for (k, v) in &req.query {
            // First occurrence wins, matching common server behaviour.
            query
                .entry(k.clone())
                .or_insert_with(|| Value::String(v.clone()));
        }
        vars.insert("query".into(), Value::Object(query));
        vars.insert(
            "body".into(),
            Value::String(String::from_utf8_lossy(&req.body).into_owned()),
        );
        vars.insert("body_size".into(), Value::from(req.body.len() as u64));
        Self { vars }
    }

    /// Request variables plus the upstream response.
    pub fn response(req: &RequestContext, resp: &ResponseContext) -> Self {
        let mut ctx = Self::request(req);
        ctx.vars.insert("status".into(), Value::from(resp.status));
        ctx.vars
            .insert("response_headers".into(), headers_to_json(&resp.headers));
        ctx.vars.insert(
            "response_body".into(),
            Value::String(String::from_utf8_lossy(&resp.body).into_owned()),
        );
        ctx.vars
            .insert("response_size".into(), Value::from(resp.body.len() as u64));
        ctx
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn has_response(&self) -> bool {
        self.vars.contains_key("status")
    }
}

/// Lower-cased header names; repeated headers are joined with ", ".
fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(map)
}
