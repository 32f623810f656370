//! # Grocer
//!
//! Backend for a grocery and medicine delivery platform.
//!
//! Consumers browse provider catalogs, place orders, and keep recurring
//! shopping lists. Providers publish items and fulfil orders. On top of the
//! CRUD API sit two language-model flows:
//!
//! - an **item matcher** that turns a free-text request ("2 litres of
//!   Nestle milk and some bread") into ranked recommendations from nearby
//!   providers, and
//! - an **order notifier** that emails providers about recurring and
//!   scheduled orders that are coming due.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  HTTP    │──▶│ DocumentStore│◀──│   Notifier   │──▶ SMTP
//! │  (api)   │   │ SQLite/memory│   └──────────────┘
//! └────┬─────┘   └──────▲───────┘
//!      │                │
//!      ▼                │
//! ┌──────────────┐   ┌──┴───────────┐
//! │ ItemMatcher  │──▶│  embeddings  │  LLM · distance · auth providers
//! └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Users, items, orders, lists |
//! | [`store`] | Document store trait and backends |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`auth`] | Identity provider client |
//! | [`api`] | HTTP handlers |
//! | [`server`] | Router and server lifecycle |
//! | [`error`] | HTTP error contract |
//! | [`llm`] | Chat model abstraction |
//! | [`prompts`] | Prompt templates and response schemas |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`search`] | Catalog embedding and top-k matching |
//! | [`distance`] | Travel distance between addresses |
//! | [`matcher`] | Natural-language item matching pipeline |
//! | [`mailer`] | Outgoing email |
//! | [`notifier`] | Approaching-order notifications |

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod distance;
pub mod embedding;
pub mod error;
mod http;
pub mod llm;
pub mod mailer;
pub mod matcher;
pub mod migrate;
pub mod models;
pub mod notifier;
pub mod prompts;
pub mod search;
pub mod server;
pub mod store;
