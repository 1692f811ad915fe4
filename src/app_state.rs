use std::sync::Arc;

use crate::config::Config;
use crate::conversation::ConversationStates;
use crate::error::AppResult;
use crate::handler::UpdateHandler;
use crate::infrastructure::messaging::Messenger;
use crate::infrastructure::sqlite_store::SqliteStore;
use crate::infrastructure::store::EngagementStore;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn EngagementStore>,
    pub messenger: Arc<dyn Messenger>,
    pub conversations: Arc<ConversationStates>,
    pub handler: Arc<UpdateHandler>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub async fn new(config: Config, messenger: Arc<dyn Messenger>) -> AppResult<Self> {
        let store =
            SqliteStore::connect(&config.database.url, config.database.max_connections).await?;
        store.initialize().await?;
        Ok(Self::with_store(config, Arc::new(store), messenger))
    }

    /// Wire every component around an already initialized store.
    pub fn with_store(
        config: Config,
        store: Arc<dyn EngagementStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let conversations = Arc::new(ConversationStates::new());
        let handler = Arc::new(UpdateHandler::new(
            store.clone(),
            messenger.clone(),
            conversations.clone(),
            config.bot.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            messenger.clone(),
            config.scheduler.clone(),
        ));

        Self {
            config,
            store,
            messenger,
            conversations,
            handler,
            scheduler,
        }
    }
}
