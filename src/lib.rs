//! Page Sentry - document observation and policy interception
//!
//! This crate watches a mutating document tree, extracts a normalized
//! plain-text rendering of its prompt and options regions, and emits that
//! text to a sink exactly once per distinct content. A cooperating policy
//! layer suppresses configured calls on named surfaces and short-circuits
//! outbound requests to blocklisted hosts.
//!
//! # Architecture
//!
//! The scheduler coalesces tree mutations and triggers passes; each pass
//! resolves the regions via selector policy, canonicalizes them into typed
//! text blocks, and hands the result to the fingerprint-gated emission
//! pipeline. The interception engine and network interceptor are installed
//! once at startup and run independently of the extraction path.

pub mod canonicalizer;
pub mod config;
pub mod emission;
pub mod intercept;
pub mod locator;
pub mod network;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod selector;
pub mod storage;
pub mod tree;
pub mod types;

// Re-export commonly used types
pub use canonicalizer::Canonicalizer;
pub use config::Config;
pub use emission::{fingerprint, DeliverySink, EmissionPipeline, StdoutSink};
pub use intercept::{
    AppendSurface, CallSurface, InterceptionEngine, InterceptionRule, Surface, SurfaceKind,
};
pub use locator::RegionLocator;
pub use network::{NetworkBackend, NetworkError, NetworkInterceptor, OutboundRequest, Response};
pub use notify::{notification_channel, LogQueue, Notifier};
pub use pipeline::ExtractionPipeline;
pub use scheduler::MutationScheduler;
pub use selector::{Selector, SelectorError, SelectorList};
pub use storage::{CookieSentry, StorageError, StorageGuard};
pub use tree::{DocumentTree, MutationEvent, MutationKind, NodeId, NodeSpec, SubscriptionId};
pub use types::{
    BlockKind, CanonicalBlock, CanonicalDocument, PassOutcome, PassState, RegionSlot, SinkError,
    SkipReason,
};
