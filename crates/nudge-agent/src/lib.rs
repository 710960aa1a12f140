pub mod anthropic;
pub mod chain;
pub mod classify;
pub mod composer;
pub mod gemini;
pub mod memory;
pub mod openai;
pub mod persona;
pub mod provider;

pub use chain::{ProviderChain, ProviderSlot};
pub use classify::FailureKind;
pub use composer::{Message, MessageComposer};
pub use persona::{Persona, PersonaRegistry};
pub use provider::{GenerationProvider, ProviderError};
