//! Core library for draftguard, a folder-backed hierarchical document
//! organizer for long-form writing.
//!
//! A workspace is a plain directory tree: one directory per project, `.txt`
//! files as document nodes, and `sub_<base>` sibling directories holding a
//! document's children. This crate keeps that on-disk structure and an
//! in-memory [`storage::ProjectTree`] in sync, layering on top of it the
//! attributes a bare filesystem cannot carry: per-item status, writing
//! goals, edit history, and anchored comments.
//!
//! Most consumers interact through [`store::ProjectStore`], which owns the
//! connected workspace and exposes the command surface (create, rename,
//! move, delete, status upgrades, editing sessions) together with change
//! notifications via [`event`].

pub mod config;
pub mod event;
pub mod session;
pub mod storage;
pub mod store;
