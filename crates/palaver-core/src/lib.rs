//!
//! Palaver Core - the execution engine for Palaver conversation flows
//!
//! This crate holds the domain model (flows, runs, contacts, location
//! hierarchies), the event-sourced execution loop that walks contacts through
//! flows, the locator-keyed asset cache sessions read from, and the contracts
//! external services implement.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - flows, runs, contacts, events and actions
pub mod domain;

/// Application services - the engine and session control loop
pub mod application;

/// Asset cache and session asset access
pub mod assets;

/// Contracts for external services
pub mod services;

/// Engine configuration
pub mod config;

/// Core types and traits
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use config::EngineConfig;
pub use error::{CoreError, MissingReference, MissingReferences};
pub use types::{DateValue, LiteralEvaluator, TemplateEvaluator, ValueType};

// Application interfaces
pub use application::{Engine, EngineBuilder, Session, SessionStatus, Trigger};

// Re-export main API types for easy use
pub use assets::{AssetCache, AssetFetcher, AssetKind, HttpAssetFetcher, ItemType, SessionAssets};
pub use domain::actions::{read_action, register_action_type, Action, EventLog, RunView};
pub use domain::contact::{Contact, Urn};
pub use domain::events::{read_event, register_event_type, Event, EventOrigin};
pub use domain::flow::{CategoryRouter, ExitRouter, Flow};
pub use domain::location::{Location, LocationHierarchy};
pub use domain::run::{Run, RunStatus};
pub use domain::{ContactUuid, FlowUuid, RunUuid};
