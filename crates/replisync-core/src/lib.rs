//! Replisync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `TreeRoot`, `RelativePath`, `PathPair`, `PassReport`
//! - **Port definitions** - Traits for adapters: `ILocalFileSystem`, `ISyncObserver`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O.
//! Ports define trait interfaces that the sync crate implements and consumes.

pub mod config;
pub mod domain;
pub mod ports;
