pub mod archive;
pub mod codec;
pub mod ledger;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod store;
pub mod validation;

pub use ledger::Ledger;
pub use orchestrator::Orchestrator;
pub use provider::{Completion, CostTable, Provider, ProviderRegistry, TokenUsage};
pub use store::{ClaimOutcome, FileStore, MemoryStore, Store};
pub use validation::StructuralPolicy;
