//! Per-request context: path parameters and type-keyed extensions.
//!
//! Middleware stores per-request state (the bearer authentication outcome)
//! in [`Extensions`]; the router fills [`PathParams`] before calling a handler.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    str::FromStr,
};

use serde::de::DeserializeOwned;

use crate::Request;

/// Type-erased request extensions keyed by `TypeId`.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }
}

/// Named captures from the matched route pattern (`/catalog/:id` → `id`).
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Parses a captured segment, e.g. an integer id.
    ///
    /// `None` when the capture is absent; `Some(Err(_))` when it does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<Result<T, T::Err>> {
        self.get(key).map(str::parse)
    }
}

/// Per-request context handed through middleware to the route handler.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        self.request.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ext = Extensions::new();
        ext.insert(7_u32);
        ext.insert(String::from("moderator"));
        assert_eq!(ext.get::<u32>(), Some(&7));
        assert_eq!(ext.get::<String>().map(String::as_str), Some("moderator"));
        ext.insert(8_u32);
        assert_eq!(ext.get::<u32>(), Some(&8));
        assert!(ext.get::<i64>().is_none());
    }

    #[test]
    fn path_params_parse() {
        let mut params = PathParams::new();
        params.insert("id".into(), "42".into());
        params.insert("bad".into(), "x".into());
        assert_eq!(params.parse::<i64>("id"), Some(Ok(42)));
        assert!(matches!(params.parse::<i64>("bad"), Some(Err(_))));
        assert!(params.parse::<i64>("missing").is_none());
    }
}
