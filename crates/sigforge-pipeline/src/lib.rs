//! Staged signal pipeline: schema registry, stage runner, orchestrator, and
//! notification dispatch.
//!
//! A run sends a `SignalRequest` through three completion stages (generate,
//! validate, optionally summarize). Every stage output is checked against its
//! schema before it is trusted; any failure aborts the run with one typed
//! error. Valid results may then be handed to a notifier on a detached task.

pub mod config;
pub mod contract;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod notifier;
pub mod schema;
pub mod stage;

pub use config::{PipelineConfig, PipelineOptions, DEFAULT_MODEL, DEFAULT_TIMEFRAMES};
pub use contract::{GenerateStage, StageContract, SummarizeStage, SummaryInput, ValidateStage};
pub use dispatch::Dispatcher;
pub use engine::SignalPipeline;
pub use events::{EventEmitter, PipelineEvent};
pub use notifier::{format_discord_message, DiscordNotifier, Notifier};
pub use schema::{FieldKind, FieldSpec, ObjectSchema, SchemaDirection, SchemaRegistry};
pub use stage::{extract_json, StageRunner};
