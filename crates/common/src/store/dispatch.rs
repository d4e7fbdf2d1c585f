use crate::path::Path;
use crate::value::{Origin, SetResult, Value};

use super::{EventLoop, Store, StoreError};

/// Leaf get/set routed through a dedicated worker thread
///
/// Every call is handed to the worker and the caller waits for the answer,
///  either blocking or by awaiting. Calls from different threads are
///  therefore applied one at a time, in arrival order.
#[derive(Debug, Clone)]
pub struct DispatchedStore {
    store: Store,
    worker: EventLoop,
}

impl DispatchedStore {
    pub fn new(store: Store) -> Result<Self, StoreError> {
        let worker = EventLoop::spawn("statetree-dispatch")?;
        Ok(Self { store, worker })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn get(&self, path: &Path) -> Option<Value> {
        let store = self.store.clone();
        let path = path.clone();
        self.worker
            .call(move || store.get(&path).map(|node| node.value().clone()))
            .flatten()
    }

    pub fn set_str(&self, path: &Path, text: &str, origin: Origin) -> Result<SetResult, StoreError> {
        let store = self.store.clone();
        let path = path.clone();
        let text = text.to_string();
        self.worker
            .call(move || store.set_str(&path, &text, origin))
            .unwrap_or_else(|| Err(anyhow::anyhow!("dispatch worker is gone").into()))
    }

    pub async fn get_async(&self, path: &Path) -> Option<Value> {
        let store = self.store.clone();
        let path = path.clone();
        self.worker
            .call_async(move || store.get(&path).map(|node| node.value().clone()))
            .await
            .flatten()
    }

    pub async fn set_str_async(
        &self,
        path: &Path,
        text: &str,
        origin: Origin,
    ) -> Result<SetResult, StoreError> {
        let store = self.store.clone();
        let path = path.clone();
        let text = text.to_string();
        self.worker
            .call_async(move || store.set_str(&path, &text, origin))
            .await
            .unwrap_or_else(|| Err(anyhow::anyhow!("dispatch worker is gone").into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatched_get_set() {
        let store = Store::new().unwrap();
        let path = Path::new("fan.speed");
        store.set(&path, Value::uint32(10, 0, 100), Origin::Local);

        let dispatched = DispatchedStore::new(store.clone()).unwrap();
        assert_eq!(
            dispatched.set_str(&path, "20", Origin::Local).unwrap(),
            SetResult::Success
        );
        assert_eq!(dispatched.get(&path), Some(Value::uint32(20, 0, 100)));
        assert_eq!(dispatched.get(&Path::new("fan.missing")), None);
        assert_eq!(store.get_as::<u32>(&path), Some(20));
    }

    #[tokio::test]
    async fn test_dispatched_async() {
        let store = Store::new().unwrap();
        let path = Path::new("fan.speed");
        store.set(&path, Value::uint32(10, 0, 100), Origin::Local);

        let dispatched = DispatchedStore::new(store).unwrap();
        assert_eq!(
            dispatched
                .set_str_async(&path, "101", Origin::Local)
                .await
                .unwrap(),
            SetResult::RangeError
        );
        assert_eq!(
            dispatched.get_async(&path).await,
            Some(Value::uint32(10, 0, 100))
        );
    }
}
