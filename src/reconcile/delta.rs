use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One mutating provider call: an action verb and its opaque body
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: Uuid,
    pub action: String,
    pub body: Value,
}

impl Request {
    pub fn new(action: impl Into<String>, body: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            body,
        }
    }
}

/// Requests needed to converge a current object onto a desired one
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delta {
    pub add: Vec<Request>,
    pub update: Vec<Request>,
    pub reorder: Option<Request>,
    pub remove: Vec<Request>,
}

impl Delta {
    /// Empty means no API call is necessary
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.reorder.is_none() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + usize::from(self.reorder.is_some()) + self.remove.len()
    }

    /// Requests in issue order: add, update, reorder, remove
    pub fn into_requests(self) -> Vec<Request> {
        let mut requests = self.add;
        requests.extend(self.update);
        requests.extend(self.reorder);
        requests.extend(self.remove);
        requests
    }
}
