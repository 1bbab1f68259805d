//! # Courier Core
//!
//! The vocabulary shared by every layer of the Courier mediator.
//!
//! ## Contents
//!
//! - **Message taxonomy**: [`Message`], [`Command`], [`Query`], [`Event`] and
//!   the [`MessageKind`] they are dispatched as
//! - **Envelopes**: the type-erased [`Request`] / [`Response`] pair that flows
//!   through a dispatch plan
//! - **Errors**: [`MediatorError`], the classification of every failure a
//!   caller can observe
//! - **Resolution**: the [`Resolver`] capability used to obtain handler and
//!   behavior instances, with [`Container`] as a reference implementation
//!
//! ```text
//! caller ──▶ Mediator ──▶ DispatchPlan ──▶ behaviors ──▶ pre ──▶ handler(s) ──▶ post
//!                              │
//!                              └── Request { message, kind, resolver, token }
//! ```
//!
//! The dispatch engine itself lives in `courier-framework`.

pub mod envelope;
pub mod error;
pub mod message;
pub mod resolver;

pub use envelope::{Request, Response};
pub use error::{BoxError, MediatorError, MediatorResult};
pub use message::{Command, Event, Message, MessageKind, Query};
pub use resolver::{Container, Instance, Lifetime, Resolver, ResolverExt, Scope};

pub use tokio_util::sync::CancellationToken;
