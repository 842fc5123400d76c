//! Honey relay - streams local LLM replies into Telegram chats
//!
//! Each inbound message becomes one outbound message that is created as a
//! placeholder, edited as the model streams, and finalized exactly once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            Webhook ingress (api)                     │
//! │   secret check  │  dedup  │  commands  │  topic gate │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Turn coordinator (turn)                   │
//! │   epochs  │  placeholder  │  timeout  │  suggestions │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │ Inference (inference)│ ────▶ │ Renderer (render)     │
//! │ chat │ generate │ v1 │       │ throttle │ retry      │
//! └─────────────────────┘       └──────────┬────────────┘
//!                                          │
//!                               ┌──────────▼────────────┐
//!                               │ Telegram sink         │
//!                               └───────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod inference;
pub mod render;
pub mod suggest;
pub mod topic;
pub mod turn;

pub use api::{ApiServer, ApiState};
pub use channels::{EditOutcome, MessageHandle, MessageSink, TelegramChannel};
pub use config::Config;
pub use error::{Error, Result};
pub use inference::{FragmentStream, GenerationRequest, InferenceClient, InferenceParams, Protocol};
pub use render::{RenderConfig, Renderer};
pub use suggest::{Catalog, CatalogItem, SuggestionMatcher};
pub use turn::{InboundMessage, TurnCoordinator, TurnOutcome, TurnSettings};
