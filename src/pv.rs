//! The NDS process-variable contract consumed by the EPICS interface.
//!
//! The device layer owns PV objects; the interface holds shared references and
//! uses only what is described by [`ProcessVariable`]: static properties to
//! build records, and `read`/`write` for runtime traffic.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    time::UnixTime,
    value::{ConversionError, DataType, Value},
    variable::Variable,
};

/// Direction of data flow, as seen from the control system
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DataDirection {
    /// Device produces values (readback)
    Input,
    /// Control system writes values to the device
    Output,
}

/// How the record backing a PV is processed
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ScanType {
    Passive,
    Periodic { seconds: f64 },
    /// Processed when the device pushes a new value
    Interrupt,
}

/// Failure raised by a PV's read or write
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PvError {
    #[error("{0}")]
    Runtime(String),
    #[error("PV {0} is read-only")]
    ReadOnly(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl PvError {
    pub fn runtime(message: impl Into<String>) -> Self {
        PvError::Runtime(message.into())
    }
}

/// A PV exposed by an NDS device
pub trait ProcessVariable: Send + Sync {
    /// Name relative to the owning port, used to address the PV in asyn links
    fn full_name_from_port(&self) -> &str;
    /// Name of the EPICS record
    fn full_external_name(&self) -> &str;
    /// Full name of the owning port
    fn port_full_name(&self) -> &str;
    /// Last component of the PV name
    fn component_name(&self) -> &str;
    fn description(&self) -> &str;
    fn direction(&self) -> DataDirection;
    fn data_type(&self) -> DataType;

    /// Labels for an enumerated integer PV, in value order
    fn enumerations(&self) -> &[String] {
        &[]
    }
    fn scan_type(&self) -> ScanType {
        ScanType::Passive
    }
    fn max_elements(&self) -> usize {
        1
    }
    fn process_at_init(&self) -> bool {
        false
    }

    /// Access to the acknowledgement channel, if this PV triggers an action
    fn action(&self) -> Option<&dyn ActionPv> {
        None
    }

    /// Read the current value.
    ///
    /// `timestamp` comes in as a hint from the caller and leaves holding the
    /// time the returned value was taken.
    fn read(&self, timestamp: &mut UnixTime) -> Result<Value, PvError>;

    fn write(&self, timestamp: UnixTime, value: &Value) -> Result<(), PvError>;
}

/// A PV that triggers a device action and is completed by an acknowledgement
pub trait ActionPv {
    /// Attach the input PV that the device uses to confirm completion
    fn set_acknowledge_pv(&self, feedback: Arc<Variable>);
}
