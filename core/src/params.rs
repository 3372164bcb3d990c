//! The per-request parameter bag.
//!
//! # Design
//! Four optional, insertion-ordered buckets. An absent bucket means nothing
//! is sent on that channel; `Some` of an empty map still counts as present.
//! The bag deserializes from `{"path": {..}, "query": {..}, "headers": {..},
//! "body": {..}}` so callers can write it with `serde_json::json!`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Bucket = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Bucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Bucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Bucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Bucket>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path.get_or_insert_with(Map::new).insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.get_or_insert_with(Map::new).insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.get_or_insert_with(Map::new).insert(name.into(), value.into());
        self
    }

    /// Put the payload under `name`. Only the first body entry is sent.
    pub fn body(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.get_or_insert_with(Map::new).insert(name.into(), value.into());
        self
    }

    /// Buckets in coercion order: path, query, headers, body.
    pub(crate) fn buckets_mut(&mut self) -> [Option<&mut Bucket>; 4] {
        [
            self.path.as_mut(),
            self.query.as_mut(),
            self.headers.as_mut(),
            self.body.as_mut(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_partial_bag() {
        let params: Params = serde_json::from_value(json!({"path": {"id": 12}})).unwrap();
        assert_eq!(params.path.unwrap()["id"], json!(12));
        assert!(params.query.is_none());
        assert!(params.headers.is_none());
        assert!(params.body.is_none());
    }

    #[test]
    fn builder_keeps_insertion_order() {
        let params = Params::new().query("id", 12).query("picId", "xyz").query("a", 1);
        let keys: Vec<&String> = params.query.as_ref().unwrap().keys().collect();
        assert_eq!(keys, ["id", "picId", "a"]);
    }

    #[test]
    fn buckets_come_in_fixed_order() {
        let mut params = Params::new().body("b", 1).path("p", 1);
        let present: Vec<bool> = params.buckets_mut().iter().map(Option::is_some).collect();
        assert_eq!(present, [true, false, false, true]);
    }
}
