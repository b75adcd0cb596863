//! Agent module — the core conversation engine
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│   Provider  │
//! │  (inbound)  │     │             │     │  (LLM API)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Session   │     │    Tool     │
//!                     │   Manager   │     │  Registry   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! `AgentLoop` drives one turn per inbound message; `ContextBuilder`
//! assembles system prompts from the workspace; `MemoryStore` consolidates
//! transcripts into durable facts; `SkillsLoader` provides optional
//! capabilities; `SubagentManager` runs isolated background tasks.

mod context;
mod r#loop;
pub mod memory;
pub mod skills;
pub mod subagent;

pub use context::{process_media, ContextBuilder, BOOTSTRAP_FILES};
pub use memory::MemoryStore;
pub use r#loop::{AgentLoop, AgentLoopConfig, DIRECT_SESSION_KEY};
pub use skills::{Skill, SkillMeta, SkillsLoader};
pub use subagent::SubagentManager;
