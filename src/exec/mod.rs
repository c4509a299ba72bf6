// src/exec/mod.rs

//! Dispatch layer.
//!
//! This module is responsible for handing work items to the outside world
//! and for asking it which convoys are stranded. Nothing here decides *what*
//! to dispatch; callers run the guards first.
//!
//! - [`backend`] provides the object-safe `Dispatcher` trait that the launch
//!   controller and the feeders use, and which tests replace with a fake.
//! - [`command`] is the production implementation, running configured shell
//!   command templates and parsing stranded-discovery output.
//! - [`task_runner`] runs one shell command with a timeout and cancellation.

pub mod backend;
pub mod command;
pub mod task_runner;

pub use backend::{DispatchFuture, Dispatcher};
pub use command::{parse_stranded, render, CommandDispatcher, CommandTemplates};
