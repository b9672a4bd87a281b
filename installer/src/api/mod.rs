// Transport-agnostic request handling
//
// A front end (the terminal wizard, or any HTTP adapter) turns its input into a
// `Request` and renders the returned `Response`.

pub mod routes;

use crate::models::responses::Page;
use crate::models::settings::FieldMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Full path, base path included
    pub path: String,
    pub form: FieldMap,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            form: FieldMap::new(),
        }
    }

    pub fn post(path: impl Into<String>, form: FieldMap) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            form,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Page(Page),
    /// Absolute location, base path included
    Redirect(String),
    Json {
        status: u16,
        body: serde_json::Value,
    },
    NotFound,
}
