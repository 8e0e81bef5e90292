use std::sync::Arc;

use wxproxy_store::{CallRecordStore, Database};
use wxproxy_weather::Dispatcher;

/// Long-lived services shared by every request.
#[derive(Debug)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub store: CallRecordStore,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(dispatcher: Dispatcher, store: CallRecordStore) -> SharedState {
        Arc::new(Self { dispatcher, store })
    }

    pub fn database(&self) -> &Database {
        self.store.database()
    }
}
