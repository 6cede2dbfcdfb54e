//! weather-face: a digital watch face with a weather line.
//!
//! The face shows time, date, the day's high/low and a condition icon. Time is
//! driven by a generation-checked one-second timer while interactive; weather
//! arrives from a companion over a data channel that the sync bridge keeps
//! subscribed and asks for a fresh reading every time the link comes up.
//!
//! Everything that touches engine state runs on one thread; background tasks
//! only post [`engine::EngineMessage`]s through a [`mailbox::Mailbox`].

pub mod bridge;
pub mod canvas;
pub mod clock;
pub mod companion;
pub mod config;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod icons;
pub mod logging;
pub mod mailbox;
pub mod protocol;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod state_machine;
pub mod timer;
pub mod timezone;
pub mod transport;
pub mod vello_canvas;
pub mod weather;
