//! # Gleaner
//!
//! An incremental harvester for infinite-scroll group feeds.
//!
//! ## Architecture
//!
//! A collection run is a loop of load and scan cycles over a live page:
//!
//! ```text
//! FeedPage → Classifier → Identity → Extractors → Harvester → Controller → Store/Export
//! ```
//!
//! - [`page`]: browser surface (headless Chrome via chromiumoxide)
//! - [`classifier`]: which nodes of a snapshot are posts
//! - [`identity`]: stable keys for posts across re-renders
//! - [`extract`]: per-field extraction with documented fallbacks
//! - [`harvester`]: scrolling, pacing, stall handling and batching
//! - [`controller`]: start / pause / resume / stop and events
//!
//! ## Quick Start
//!
//! ```bash
//! # Collect 200 posts from a group
//! gleaner collect https://www.facebook.com/groups/424242 --target 200
//!
//! # Re-export the last partial result
//! gleaner export --partial
//!
//! # Show the last run
//! gleaner status
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires the store and the
/// configuration together and hands out collection controllers.
pub mod app;

/// Element classification with per-layout profiles.
pub mod classifier;

/// Command-line interface using clap.
///
/// - `collect <url> --target N` - Run a collection and export it
/// - `export [--partial]` - Re-export the last stored result
/// - `status` - Show the last run state and recent runs
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/gleaner/config.toml` with one section per component.
pub mod config;

/// Collection lifecycle and events.
pub mod controller;

/// Core domain models.
///
/// - [`Item`](domain::Item): One harvested post with its replies
/// - [`GroupInfo`](domain::GroupInfo): The feed container's metadata
/// - [`HarvestReport`](domain::HarvestReport): The exported result envelope
/// - [`CollectionState`](domain::CollectionState): Lifecycle state of a run
pub mod domain;

/// JSON export with size-based splitting.
pub mod export;

/// Field extractors: author, text, timestamp, media, reactions, replies.
pub mod extract;

/// The load / scan loop.
pub mod harvester;

/// Identity resolution for candidate nodes.
pub mod identity;

/// Browser page abstraction.
///
/// - [`FeedPage`](page::FeedPage): Async trait the harvester drives
/// - [`ChromePage`](page::ChromePage): chromiumoxide implementation
pub mod page;

/// SQLite persistence layer.
///
/// - [`ResultStore`](store::ResultStore): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
