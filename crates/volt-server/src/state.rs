use volt_core::{ChatRelay, ConversationSource, Services};
use volt_memory::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub relay: ChatRelay,
    pub memory: MemoryStore,
    pub conversations: ConversationSource,
}

impl AppState {
    pub fn new(relay: ChatRelay, memory: MemoryStore, conversations: ConversationSource) -> Self {
        Self {
            relay,
            memory,
            conversations,
        }
    }
}

impl From<Services> for AppState {
    fn from(services: Services) -> Self {
        Self::new(services.relay, services.memory, services.conversations)
    }
}
