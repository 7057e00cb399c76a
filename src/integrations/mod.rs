// src/integrations/mod.rs — Collaborator traits and their adapters

pub mod marketplace;
pub mod store;
pub mod telegram;
pub mod types;
pub mod vision;

pub use marketplace::MarketplaceClient;
pub use store::JsonFileStore;
pub use telegram::TelegramTransport;
pub use vision::OpenAIVisionAnalyzer;
