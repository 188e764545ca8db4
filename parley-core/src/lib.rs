//! # parley-core
//!
//! Core library for parley - a chat-message intent router.
//!
//! This library provides:
//! - Passthrough guards and shell sanitizing for inbound chat text
//! - Rule-based pattern matching with session auto-context
//! - Confidence-scored classification with correction learning
//! - Conversation threads, multi-intent parsing and a response cache
//! - A/B experiments over classifier parameters
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Every message flows through the [`Router`]:
//! - **Guards:** greetings, questions and chat pass through untouched
//! - **Patterns:** an ordered rule library turns known phrasings into commands
//! - **Classifier:** scores everything else and asks when unsure
//!
//! ## Example
//!
//! ```rust,no_run
//! use parley_core::{Config, RouteContext, Router};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Route a message
//! let router = Router::new(&config);
//! let ctx = RouteContext::new("u1", "general");
//! let resolution = router.resolve("deploy JUDO to staging", &ctx);
//! assert_eq!(resolution.text, "deploy JUDO --env=staging");
//! ```

// Re-export commonly used items at the crate root
pub use cache::ResponseCache;
pub use classifier::{ClassificationResult, IntentClassifier};
pub use config::Config;
pub use error::{Error, Result};
pub use experiments::{ExperimentFramework, Variant};
pub use guards::PassthroughReason;
pub use router::{Decomposition, Resolution, Router, RouterMetrics};
pub use types::*;

// Public modules
pub mod cache;
pub mod classifier;
pub mod config;
pub mod entities;
pub mod error;
pub mod experiments;
pub mod guards;
pub mod logging;
pub mod multi_intent;
pub mod patterns;
pub mod router;
pub mod sanitize;
pub mod thread;
pub mod types;
