//! # boxoffice-db: Database Layer for the Box Office
//!
//! This crate provides database access for the box office back office.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  boxoffice-settlement (PurchaseService, Reconciler, LiveSession)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │                ★ boxoffice-db (THIS CRATE) ★                  │     │
//! │  │                                                               │     │
//! │  │   Database ──► products()  ──► ProductRepository             │     │
//! │  │            ──► guests()    ──► GuestRepository               │     │
//! │  │            ──► purchases() ──► PurchaseRepository            │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL) ◄── migrations/sqlite/*.sql                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boxoffice_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("boxoffice.db")).await?;
//! let purchase = db.purchases().get_by_id(id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::guest::GuestRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::PurchaseRepository;
