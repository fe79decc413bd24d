//! In-memory publisher test double, mirroring the teacher's `TestNats`:
//! publishes are recorded rather than sent anywhere, with helpers tests use
//! to assert on what went out.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::PublishError;

use super::Publisher;

pub struct TestBroker {
    published: Mutex<Vec<(String, serde_json::Value)>>,
    fail_next: Mutex<bool>,
}

impl TestBroker {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
        }
    }

    /// Makes the next `publish_json` call fail, to exercise the
    /// publish-failure-keeps-pending path.
    pub fn fail_next_publish(&self) {
        *self.fail_next.lock().expect("fail_next mutex poisoned") = true;
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().expect("published mutex poisoned").clone()
    }

    pub fn was_published_with_key(&self, key: &str) -> bool {
        self.published
            .lock()
            .expect("published mutex poisoned")
            .iter()
            .any(|(k, _)| k == key)
    }
}

impl Default for TestBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for TestBroker {
    async fn publish_json(&self, payload: &serde_json::Value, key: &str) -> Result<(), PublishError> {
        let mut fail_next = self.fail_next.lock().expect("fail_next mutex poisoned");
        if *fail_next {
            *fail_next = false;
            return Err(PublishError::Timeout);
        }
        self.published
            .lock()
            .expect("published mutex poisoned")
            .push((key.to_string(), payload.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        Ok(())
    }
}
