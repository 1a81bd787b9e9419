//! # EVC Vision Library
//!
//! Producer side of the shared detection state. An object detector reports
//! the class labels found in each camera frame; the worker maps them onto
//! the `car_detected` / `ev_detected` / `normal_detected` cells and stamps
//! `last_detected_time` whenever a car and an EV plate appear together.
//!
//! The detector itself stays outside this crate. It plugs in through
//! [`DetectionSource`]; two sources ship here:
//!
//! - [`ScriptedSource`] - replays a configured label timeline (simulation, demos)
//! - [`JsonLinesSource`] - reads `{"labels": [...]}` lines from an external detector

pub mod error;
pub mod source;
pub mod worker;

pub use error::VisionError;
pub use source::{DetectionSource, Frame, JsonLinesSource, ScriptedSource, build_source};
pub use worker::{LabelMap, VisionStats, VisionWorker};
