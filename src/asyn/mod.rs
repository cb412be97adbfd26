//! The slice of the asyn port-driver model that the interface talks to.
//!
//! An [`AsynUser`] carries one request: the reason and address it targets, the
//! timestamp of the value moved, and the error slot filled on failure. An
//! [`AsynDriver`] is the port hosting the interface. It owns the interrupt
//! lists that records subscribe through and loads record databases.

use std::{fmt, io, path::Path, sync::Arc, time::Duration};

use crate::{pv::ProcessVariable, registry::Reason, time::EpicsTimeStamp};

mod interrupt;
mod link;
mod port;

pub use interrupt::{Interrupt, InterruptCallback, InterruptList, InterruptLists, InterruptPass};
pub use link::{AsynLink, LinkError};
pub use port::PortDriver;

/// Outcome of an asyn request
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum AsynStatus {
    #[default]
    Success,
    Error,
}

/// Per-request context, as handed over by the asyn layer
#[derive(Clone)]
pub struct AsynUser {
    pub reason: Reason,
    addr: i32,
    pub timeout: Duration,
    pub timestamp: EpicsTimeStamp,
    pub aux_status: AsynStatus,
    error_message: Option<Arc<str>>,
    user_data: Option<Arc<dyn ProcessVariable>>,
}

impl fmt::Debug for AsynUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsynUser")
            .field("reason", &self.reason)
            .field("addr", &self.addr)
            .field("timestamp", &self.timestamp)
            .field("aux_status", &self.aux_status)
            .field("error_message", &self.error_message)
            .field(
                "user_data",
                &self.user_data.as_ref().map(|pv| pv.full_name_from_port()),
            )
            .finish()
    }
}

impl AsynUser {
    pub fn new(addr: i32) -> Self {
        AsynUser {
            reason: 0,
            addr,
            timeout: Duration::from_secs(1),
            timestamp: EpicsTimeStamp::default(),
            aux_status: AsynStatus::Success,
            error_message: None,
            user_data: None,
        }
    }

    /// Sub-address within the port
    pub fn addr(&self) -> i32 {
        self.addr
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// The interned message, to compare allocations
    pub fn error_message_arc(&self) -> Option<&Arc<str>> {
        self.error_message.as_ref()
    }

    /// Length of the error slot contents, as reported to asyn
    pub fn error_message_size(&self) -> usize {
        self.error_message.as_ref().map_or(0, |m| m.len())
    }

    pub fn set_error(&mut self, message: Arc<str>) {
        self.error_message = Some(message);
        self.aux_status = AsynStatus::Error;
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// The PV bound by `drvUserCreate`, if any
    pub fn user_data(&self) -> Option<&Arc<dyn ProcessVariable>> {
        self.user_data.as_ref()
    }

    pub(crate) fn set_user_data(&mut self, pv: Arc<dyn ProcessVariable>) {
        self.user_data = Some(pv);
    }
}

/// The port driver hosting an interface
pub trait AsynDriver: Send + Sync {
    fn port_name(&self) -> &str;

    /// Subscription lists, one per interrupt interface
    fn interrupts(&self) -> &InterruptLists;

    /// Load a record database file into the IOC
    fn load_database(&self, path: &Path) -> io::Result<()>;

    /// Ask the IOC to process a record once at startup
    fn process_at_init(&self, record: &str) {
        let _ = record;
    }
}
