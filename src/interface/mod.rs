//! The EPICS interface of an NDS port.
//!
//! [`EpicsInterface`] sits between device PVs and an asyn port. During
//! startup every PV is registered, which assigns its reason and appends its
//! records to the autogenerated database. [`Interface::registration_terminated`]
//! then writes that database out and has the port load it. From then on the
//! port dispatches reads and writes by reason (see `dispatch`), and device
//! code pushes new values to subscribed records (see `fanout`).

use std::{
    io::{self, Write},
    path::PathBuf,
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    asyn::{AsynDriver, LinkError},
    database::{self, ConfigurationError},
    interning::ErrorMessages,
    pv::ProcessVariable,
    registry::{PvRegistry, Reason, RegistryError},
    time::{TimeConversionError, UnixTime},
    utils::get_default_database_dir,
    value::{ConversionError, DataType, Value},
    variable::Variable,
};

mod dispatch;
mod fanout;

/// The only asyn address PVs are served on
pub const PORT_ADDRESS: i32 = 0;

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("Cannot generate a record for {pv}: {source}")]
    Configuration {
        pv: String,
        #[source]
        source: ConfigurationError,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("PV {0} is not registered")]
    NotRegistered(String),
    #[error("Registration was already terminated")]
    RegistrationTerminated,
    #[error(transparent)]
    Time(#[from] TimeConversionError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Could not write the record database: {0}")]
    Database(#[from] io::Error),
    #[error("No interrupt interface carries {0:?} values")]
    NoInterruptCategory(DataType),
    #[error("PV {0} was never initialized with an interface")]
    NotInitialized(String),
    #[error("PV {0} has no acknowledge PV")]
    NoAcknowledgePv(String),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// What device support code sees of the control-system interface
pub trait Interface: Send + Sync {
    /// Register a PV, generating its records. Returns its reason.
    fn register_pv(&self, pv: Arc<dyn ProcessVariable>) -> Result<Reason, InterfaceError>;

    fn deregister_pv(&self, pv: &Arc<dyn ProcessVariable>);

    /// Write out and load the generated database. Returns its location.
    fn registration_terminated(&self) -> Result<PathBuf, InterfaceError>;

    /// Notify subscribed records of a new value. Returns the number notified.
    fn push(
        &self,
        pv: &dyn ProcessVariable,
        timestamp: UnixTime,
        value: &Value,
    ) -> Result<usize, InterfaceError>;
}

#[derive(Default)]
struct DatabaseText {
    text: String,
    /// Set once the database has been written and loaded
    finalized: Option<PathBuf>,
}

pub struct EpicsInterface {
    driver: Arc<dyn AsynDriver>,
    registry: RwLock<PvRegistry>,
    database: Mutex<DatabaseText>,
    errors: ErrorMessages,
    database_dir: PathBuf,
    me: Weak<EpicsInterface>,
}

impl EpicsInterface {
    pub fn driver(&self) -> &Arc<dyn AsynDriver> {
        &self.driver
    }

    /// Record definitions generated so far
    pub fn autogenerated_database(&self) -> String {
        self.database.lock().text.clone()
    }

    /// Where the database was written, once registration is terminated
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.lock().finalized.clone()
    }

    pub fn reason_of(&self, name: &str) -> Option<Reason> {
        self.registry.read().reason_of(name)
    }

    pub fn pv_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Distinct error messages reported so far
    pub fn error_messages(&self) -> &ErrorMessages {
        &self.errors
    }

    /// Create, attach and register the feedback PV of an action
    fn register_feedback(&self, action: &Arc<dyn ProcessVariable>) -> Result<(), InterfaceError> {
        let Some(capability) = action.action() else {
            return Ok(());
        };
        let feedback = Variable::feedback_for(action.as_ref());
        let me: Weak<dyn Interface> = self.me.clone();
        feedback.attach(me);
        self.register_pv(feedback.clone())?;
        capability.set_acknowledge_pv(feedback);

        let mut database = self.database.lock();
        for record in database::action_relay_records(action.full_external_name()) {
            database.text.push_str(&record.to_string());
        }
        Ok(())
    }
}

impl Interface for EpicsInterface {
    fn register_pv(&self, pv: Arc<dyn ProcessVariable>) -> Result<Reason, InterfaceError> {
        let record = database::pv_record(pv.as_ref(), PORT_ADDRESS).map_err(|source| {
            InterfaceError::Configuration {
                pv: pv.full_name_from_port().to_owned(),
                source,
            }
        })?;

        let mut database = self.database.lock();
        if database.finalized.is_some() {
            return Err(InterfaceError::RegistrationTerminated);
        }
        let mut registry = self.registry.write();
        if pv.action().is_some() {
            // The feedback PV must register too, so check it before the action
            let feedback_name = format!("{}_r", pv.full_name_from_port());
            if registry.reason_of(&feedback_name).is_some() {
                return Err(RegistryError::AlreadyRegistered(feedback_name).into());
            }
        }
        let reason = registry.register(pv.clone())?;
        drop(registry);
        debug!(
            "Registered {} as {} with reason {reason}",
            pv.full_name_from_port(),
            pv.full_external_name()
        );
        if pv.process_at_init() {
            self.driver.process_at_init(pv.full_external_name());
        }
        database.text.push_str(&record.to_string());
        drop(database);

        self.register_feedback(&pv)?;
        Ok(reason)
    }

    fn deregister_pv(&self, pv: &Arc<dyn ProcessVariable>) {
        debug!(
            "Ignoring deregistration of {}: reasons are never reused",
            pv.full_name_from_port()
        );
    }

    fn registration_terminated(&self) -> Result<PathBuf, InterfaceError> {
        let mut database = self.database.lock();
        if database.finalized.is_some() {
            return Err(InterfaceError::RegistrationTerminated);
        }
        let mut file = tempfile::Builder::new()
            .prefix("nds_epics_")
            .suffix(".db")
            .tempfile_in(&self.database_dir)?;
        file.write_all(database.text.as_bytes())?;
        file.flush()?;
        let (_, path) = file.keep().map_err(|e| e.error)?;

        info!(
            "Loading {} autogenerated records from {}",
            self.registry.read().len(),
            path.display()
        );
        if let Err(e) = self.driver.load_database(&path) {
            warn!("Port {} could not load {}: {e}", self.driver.port_name(), path.display());
        }
        database.finalized = Some(path.clone());
        Ok(path)
    }

    fn push(
        &self,
        pv: &dyn ProcessVariable,
        timestamp: UnixTime,
        value: &Value,
    ) -> Result<usize, InterfaceError> {
        self.push_value(pv, timestamp, value)
    }
}

/// Builds an [`EpicsInterface`] on top of a port driver
pub struct InterfaceBuilder {
    driver: Arc<dyn AsynDriver>,
    database_dir: Option<PathBuf>,
}

impl InterfaceBuilder {
    pub fn new(driver: Arc<dyn AsynDriver>) -> Self {
        InterfaceBuilder {
            driver,
            database_dir: None,
        }
    }

    /// Directory the database is written to. Defaults to `NDS_EPICS_DB_DIR`,
    /// then the system temporary directory.
    pub fn database_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.database_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Arc<EpicsInterface> {
        let database_dir = self.database_dir.unwrap_or_else(get_default_database_dir);
        Arc::new_cyclic(|me| EpicsInterface {
            driver: self.driver,
            registry: RwLock::new(PvRegistry::new()),
            database: Mutex::new(DatabaseText::default()),
            errors: ErrorMessages::new(),
            database_dir,
            me: me.clone(),
        })
    }
}
