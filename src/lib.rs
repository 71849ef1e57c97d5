//! # boardshelf
//!
//! A board game catalog served over a small async HTTP/1.1 stack: list with
//! filter/sort/paging and fetch-by-id through a read-through, single-flight
//! cache; update and delete gated by signed bearer tokens carrying role claims.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use boardshelf::account::{AccountService, InMemoryCredentials};
//! use boardshelf::api::{self, AppState};
//! use boardshelf::catalog::CatalogService;
//! use boardshelf::database::InMemoryStore;
//! use boardshelf::security::TokenService;
//! use boardshelf::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = Arc::new(TokenService::new(
//!         b"change-me-change-me-change-me-32b",
//!         "boardshelf",
//!         "boardshelf-clients",
//!     ));
//!     let state = Arc::new(AppState {
//!         catalog: Arc::new(CatalogService::new(Arc::new(InMemoryStore::demo()))),
//!         accounts: Arc::new(AccountService::new(
//!             Arc::new(InMemoryCredentials::new()),
//!             Arc::clone(&tokens),
//!         )),
//!         tokens,
//!     });
//!     let app = api::pipeline(state);
//!
//!     Server::bind("127.0.0.1:8080")
//!         .await?
//!         .run_until(
//!             move |req| {
//!                 let app = app.clone();
//!                 async move { app.handle(req).await }
//!             },
//!             async { let _ = tokio::signal::ctrl_c().await; },
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod server;

pub mod context;
pub mod middleware;
pub mod router;

pub mod cache;
pub mod error;
pub mod model;
pub mod query;
pub mod security;

pub mod account;
pub mod catalog;
pub mod database;

pub mod api;
pub mod config;

pub use error::{ServiceError, ServiceResult, ValidationErrors};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
