pub mod blockchain;
pub mod llm;
pub mod memory;
pub mod oauth;
pub mod postgres;
pub mod store;

pub use blockchain::{BlockchainClient, HttpBlockchainClient, TokenActivity};
pub use llm::{ChatSignalModel, SignalContext, SignalModel};
pub use memory::MemoryStore;
pub use oauth::{HttpOAuthClient, OAuthProfile, OAuthProvider};
pub use postgres::PostgresStore;
pub use store::Store;
