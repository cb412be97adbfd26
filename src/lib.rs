//! EPICS asyn support for NDS device PVs.
//!
//! This crate connects the process variables of an NDS device to an EPICS IOC
//! through an asyn port. Device code describes its PVs once; this crate then
//! generates the EPICS records for them, answers the IOC's reads and writes,
//! and pushes device-side updates to records scanned on "I/O Intr".
//!
//! The pieces are:
//!
//! - [`ProcessVariable`], the trait a device PV implements, and [`Variable`], a
//!   ready-made in-memory PV.
//! - [`EpicsInterface`], which hands out asyn "reasons" as PVs register, builds
//!   the record database (module [database]) and loads it when registration
//!   ends.
//! - The read/write entry points on [`EpicsInterface`] that the port calls,
//!   and [`Interface::push`] for updates flowing the other way.
//! - A model of the asyn port itself (module [asyn]): [`asyn::AsynUser`],
//!   interrupt subscription lists, and [`asyn::PortDriver`] as an in-process
//!   port.
//! - Conversion between Unix and EPICS epoch timestamps, in module [time].
//!
//! ## Example
//!
//! Expose a single temperature reading and push a new value to it:
//!
//! ```
//! use std::sync::Arc;
//!
//! use ndsepics::{
//!     DataType, Interface, InterfaceBuilder, ScanType, UnixTime, VariableBuilder,
//!     asyn::PortDriver,
//! };
//!
//! let port = Arc::new(PortDriver::new("DEV"));
//! let interface = InterfaceBuilder::new(port.clone())
//!     .database_dir(std::env::temp_dir())
//!     .build();
//!
//! let temperature = VariableBuilder::new("DEV", "TEMP", DataType::Float64)
//!     .description("Sensor temperature")
//!     .scan(ScanType::Interrupt)
//!     .build();
//! temperature.initialize(&interface).unwrap();
//! assert!(interface.autogenerated_database().contains("record(ai, \"TEMP\")"));
//!
//! let database = interface.registration_terminated().unwrap();
//! assert_eq!(port.loaded_databases(), vec![database]);
//!
//! // Nothing has subscribed yet
//! assert_eq!(temperature.set_value(UnixTime::now(), 23.5).unwrap(), 0);
//! ```

pub mod asyn;
pub mod database;
pub mod interface;
pub mod interning;
pub mod pv;
pub mod registry;
pub mod time;
pub mod utils;
pub mod value;
pub mod variable;

pub use crate::interface::{EpicsInterface, Interface, InterfaceBuilder, InterfaceError};
pub use crate::pv::{ActionPv, DataDirection, ProcessVariable, PvError, ScanType};
pub use crate::registry::Reason;
pub use crate::time::{EpicsTimeStamp, UnixTime};
pub use crate::value::{DataType, Value};
pub use crate::variable::{Variable, VariableBuilder};
