//! An in-process, schema-flexible, tree-structured scene graph data store.
//!
//! # Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Storage                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │        Path / Query (path/)  — dotted navigation        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                             ↓                                 │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │           Views (view/)  — copy-by-value handles         │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                             ↓                                 │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │       Container (container/)  — id, layout, buffer       │  │
//! │  │          reschema on shape change, events on write       │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                    ↓                        ↓                 │
//! │  ┌───────────────────────────┐  ┌────────────────────────┐  │
//! │  │  Registry (registry.rs)    │  │  Event Bus (event/)     │  │
//! │  │  id→container, parent map  │  │  per-container subs,    │  │
//! │  └───────────────────────────┘  │  ancestor bubbling       │  │
//! │                    ↓             └────────────────────────┘  │
//! │  ┌───────────────────────────┐                                │
//! │  │  Buffer Pool (pool/)        │                                │
//! │  │  size-classed free lists    │                                │
//! │  └───────────────────────────┘                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - shared primitives (`ContainerId`, tunable config constants)
//! - [`types`] - element type system and the `Scalar` trait
//! - [`layout`] - field schemas and the layout builder
//! - [`pool`] - the size-classed buffer pool containers rent from
//! - [`container`] - the container itself: reads, writes, reschema, structural edits
//! - [`registry`] - the id→container directory and parent-tracking table
//! - [`event`] - the subscription-based event bus and ancestor bubbling
//! - [`view`] - copy-by-value handles (`ObjectView`, `FieldView`, `ArrayView`, `MemberView`)
//! - [`path`] - dotted-path navigation and the fluent `Query` builder
//! - [`storage`] - the entry point: one registry, one pool, one root
//! - [`codec`] - JSON and binary snapshot collaborators
//!
//! # Quick Start
//! ```
//! use scenegraph::Storage;
//!
//! let storage = Storage::new();
//! let root = storage.root();
//! root.write("hp", 42i32, true).unwrap();
//! assert_eq!(root.read::<i32>("hp").unwrap(), 42);
//! ```

pub mod codec;
pub mod common;
pub mod container;
pub mod error;
pub mod event;
pub mod layout;
pub mod path;
pub mod pool;
pub mod registry;
pub mod storage;
pub mod types;
pub mod view;

pub use common::ContainerId;
pub use error::{Error, Result};
pub use event::{Event, EventKind, SubscriptionHandle};
pub use layout::{Layout, LayoutBuilder, LayoutRole};
pub use path::query::Query;
pub use storage::Storage;
pub use types::{Char16, ElementType, Scalar};
pub use view::{ArrayView, FieldView, MemberView, ObjectView};
