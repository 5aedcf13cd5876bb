//! # Reveille Core Library
//!
//! This library provides the alarm instance lifecycle engine for
//! Reveille: a durable, time-driven state machine that decides, for
//! every scheduled alarm occurrence, when to notify, when to ring,
//! when to allow snooze, and when to give up -- and that survives
//! process death, reboot and clock changes by re-deriving state from
//! what is persisted.
//!
//! ## Architecture
//!
//! - **State Machine Core** ([`machine`]): pure transition logic; no
//!   I/O. Given an instance and the current time it computes the next
//!   state, the side effects and the single next wake-up.
//! - **Reconciliation Driver** ([`Engine`]): the only writer. Routes
//!   scheduled wake-ups, user actions and bulk re-registration through
//!   the core, persisting state before playing side effects.
//! - **Instance Store** ([`AlarmStore`]): SQLite persistence for
//!   templates, instances and the engine's counters.
//! - **Time Source** ([`clock`]): `now()` plus keyed one-shot wake-up
//!   scheduling; the engine never sleeps or polls the system clock.
//! - **Side-Effect Ports** ([`ports`]): notifier and sounder traits
//!   the platform layer implements; [`Klaxon`] is the reference
//!   sounder over an abstract audio backend.
//!
//! ## Key Components
//!
//! - [`Engine`]: reconciliation driver and public entry points
//! - [`AlarmTemplate`] / [`AlarmInstance`]: the data model
//! - [`EnginePolicy`]: timing and snooze policy (TOML-backed)
//! - [`testing`]: in-memory fakes for ports and clock

pub mod alarm;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod klaxon;
pub mod machine;
pub mod ports;
pub mod storage;
pub mod testing;

pub use alarm::{AlarmInstance, AlarmTemplate, DaySet, InstanceState, ModeOption, VolumeSetting};
pub use clock::{Clock, ScheduledWake, SystemClock, WakeQueue, WakeScheduler, WakeTag};
pub use engine::{Engine, EngineContext};
pub use error::{ConfigError, CoreError, DatabaseError, SounderError, ValidationError};
pub use events::Event;
pub use klaxon::{AudioBackend, Klaxon};
pub use ports::{Notifier, Sounder};
pub use storage::{AlarmStore, EnginePolicy};
