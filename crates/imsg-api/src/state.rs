use std::sync::Arc;

use imsg_db::MessageStore;

use crate::error::{ApiError, join_error};
use crate::rate_limit::SendRateLimiter;
use crate::sender::MessageSender;
use crate::settings::Settings;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<dyn MessageStore>,
    pub sender: Arc<dyn MessageSender>,
    pub limiter: SendRateLimiter,
    pub settings: Settings,
}

impl AppStateInner {
    pub fn new(
        store: Arc<dyn MessageStore>,
        sender: Arc<dyn MessageSender>,
        settings: Settings,
    ) -> AppState {
        let limiter = SendRateLimiter::new(settings.send_rate_limit, settings.send_rate_window());
        Arc::new(Self {
            store,
            sender,
            limiter,
            settings,
        })
    }

    /// Run a blocking store read off the async runtime.
    pub async fn read<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn MessageStore) -> imsg_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(join_error)?;
        Ok(result?)
    }
}
