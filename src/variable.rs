//! An in-memory [`ProcessVariable`] for device support code.
//!
//! A [`Variable`] keeps the last value and timestamp. Device code updates an
//! input variable with [`Variable::set_value`], which also pushes the value to
//! every subscribed record. Writes from EPICS to an output variable are stored
//! and, if a write handler is installed, forwarded to the device first.
//!
//! Action variables (see [`VariableBuilder::action`]) are outputs whose
//! completion is confirmed by the device later through
//! [`Variable::acknowledge`].

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    interface::{Interface, InterfaceError},
    pv::{ActionPv, DataDirection, ProcessVariable, PvError, ScanType},
    registry::Reason,
    time::UnixTime,
    value::{DataType, Value},
};

/// Device hook run for every write before the value is stored
pub type WriteHandler = Box<dyn Fn(UnixTime, &Value) -> Result<(), PvError> + Send + Sync>;

struct State {
    value: Value,
    timestamp: UnixTime,
}

pub struct Variable {
    name: String,
    external_name: String,
    port: String,
    component: String,
    description: String,
    direction: DataDirection,
    data_type: DataType,
    enumerations: Vec<String>,
    scan: ScanType,
    max_elements: usize,
    process_at_init: bool,
    state: Mutex<State>,
    interface: Mutex<Option<Weak<dyn Interface>>>,
    on_write: Option<WriteHandler>,
    /// Present on action variables, filled once the feedback PV exists
    acknowledge: Option<OnceLock<Arc<Variable>>>,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("external_name", &self.external_name)
            .field("direction", &self.direction)
            .field("data_type", &self.data_type)
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl Variable {
    /// Make the input PV that acknowledges `action`.
    ///
    /// It lives beside the action PV, with `_r` appended to its names.
    pub fn feedback_for(action: &dyn ProcessVariable) -> Arc<Variable> {
        VariableBuilder::new(
            action.port_full_name(),
            &format!("{}_r", action.full_name_from_port()),
            DataType::Int32,
        )
        .external_name(&format!("{}_r", action.full_external_name()))
        .component_name(&format!("{}_r", action.component_name()))
        .description(&format!("Feedback for {}", action.full_external_name()))
        .scan(ScanType::Interrupt)
        .build()
    }

    /// Attach to an interface and register with it
    pub fn initialize<I>(self: &Arc<Self>, interface: &Arc<I>) -> Result<Reason, InterfaceError>
    where
        I: Interface + 'static,
    {
        let weak = Arc::downgrade(interface);
        let weak: Weak<dyn Interface> = weak;
        self.attach(weak);
        interface.register_pv(self.clone())
    }

    /// Set the interface that [`Variable::set_value`] pushes through
    pub(crate) fn attach(&self, interface: Weak<dyn Interface>) {
        *self.interface.lock() = Some(interface);
    }

    /// The current value and the time it was taken
    pub fn load(&self) -> (UnixTime, Value) {
        let state = self.state.lock();
        (state.timestamp, state.value.clone())
    }

    pub fn value(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Store a new value from the device, and push it to subscribers.
    ///
    /// Returns the number of subscribers notified.
    pub fn set_value(
        &self,
        timestamp: UnixTime,
        value: impl Into<Value>,
    ) -> Result<usize, InterfaceError> {
        let value = value.into().convert_to(self.data_type)?;
        self.store(timestamp, value.clone());
        let interface = self
            .interface
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| InterfaceError::NotInitialized(self.name.clone()))?;
        interface.push(self, timestamp, &value)
    }

    /// Confirm completion of an action through its feedback PV
    pub fn acknowledge(&self, timestamp: UnixTime, value: i32) -> Result<usize, InterfaceError> {
        let feedback = self
            .acknowledge
            .as_ref()
            .and_then(OnceLock::get)
            .ok_or_else(|| InterfaceError::NoAcknowledgePv(self.name.clone()))?;
        debug!("Acknowledging {} with {value}", self.name);
        feedback.set_value(timestamp, value)
    }

    /// The feedback PV of an action, once registered
    pub fn acknowledge_pv(&self) -> Option<&Arc<Variable>> {
        self.acknowledge.as_ref().and_then(OnceLock::get)
    }

    fn store(&self, timestamp: UnixTime, value: Value) {
        let mut state = self.state.lock();
        state.value = value;
        state.timestamp = if timestamp.is_zero() {
            UnixTime::now()
        } else {
            timestamp
        };
    }
}

impl ProcessVariable for Variable {
    fn full_name_from_port(&self) -> &str {
        &self.name
    }
    fn full_external_name(&self) -> &str {
        &self.external_name
    }
    fn port_full_name(&self) -> &str {
        &self.port
    }
    fn component_name(&self) -> &str {
        &self.component
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn direction(&self) -> DataDirection {
        self.direction
    }
    fn data_type(&self) -> DataType {
        self.data_type
    }
    fn enumerations(&self) -> &[String] {
        &self.enumerations
    }
    fn scan_type(&self) -> ScanType {
        self.scan
    }
    fn max_elements(&self) -> usize {
        self.max_elements
    }
    fn process_at_init(&self) -> bool {
        self.process_at_init
    }
    fn action(&self) -> Option<&dyn ActionPv> {
        self.acknowledge.as_ref().map(|_| self as &dyn ActionPv)
    }

    fn read(&self, timestamp: &mut UnixTime) -> Result<Value, PvError> {
        let state = self.state.lock();
        *timestamp = state.timestamp;
        Ok(state.value.clone())
    }

    fn write(&self, timestamp: UnixTime, value: &Value) -> Result<(), PvError> {
        if self.direction == DataDirection::Input {
            return Err(PvError::ReadOnly(self.name.clone()));
        }
        let value = value.convert_to(self.data_type)?;
        if let Some(handler) = &self.on_write {
            handler(timestamp, &value)?;
        }
        trace!("{} <= {value:?}", self.name);
        self.store(timestamp, value);
        Ok(())
    }
}

impl ActionPv for Variable {
    fn set_acknowledge_pv(&self, feedback: Arc<Variable>) {
        if let Some(slot) = &self.acknowledge
            && slot.set(feedback).is_err()
        {
            debug!("{} already has an acknowledge PV", self.name);
        }
    }
}

/// Builds a [`Variable`]. Defaults to a passive, scalar input.
pub struct VariableBuilder {
    port: String,
    name: String,
    external_name: Option<String>,
    component: Option<String>,
    description: String,
    direction: DataDirection,
    data_type: DataType,
    enumerations: Vec<String>,
    scan: ScanType,
    max_elements: usize,
    process_at_init: bool,
    initial_value: Option<Value>,
    on_write: Option<WriteHandler>,
    action: bool,
}

impl VariableBuilder {
    /// A variable named `name` within `port`.
    ///
    /// Unless overridden the record name is also `name`.
    pub fn new(port: &str, name: &str, data_type: DataType) -> Self {
        VariableBuilder {
            port: port.to_owned(),
            name: name.to_owned(),
            external_name: None,
            component: None,
            description: String::new(),
            direction: DataDirection::Input,
            data_type,
            enumerations: Vec::new(),
            scan: ScanType::Passive,
            max_elements: 1,
            process_at_init: false,
            initial_value: None,
            on_write: None,
            action: false,
        }
    }
    pub fn output(mut self) -> Self {
        self.direction = DataDirection::Output;
        self
    }
    pub fn direction(mut self, direction: DataDirection) -> Self {
        self.direction = direction;
        self
    }
    pub fn external_name(mut self, name: &str) -> Self {
        self.external_name = Some(name.to_owned());
        self
    }
    pub fn component_name(mut self, name: &str) -> Self {
        self.component = Some(name.to_owned());
        self
    }
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }
    pub fn enumerations(mut self, labels: Vec<String>) -> Self {
        self.enumerations = labels;
        self
    }
    pub fn scan(mut self, scan: ScanType) -> Self {
        self.scan = scan;
        self
    }
    pub fn max_elements(mut self, count: usize) -> Self {
        self.max_elements = count;
        self
    }
    pub fn process_at_init(mut self, process: bool) -> Self {
        self.process_at_init = process;
        self
    }
    pub fn initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }
    pub fn on_write<F>(mut self, handler: F) -> Self
    where
        F: Fn(UnixTime, &Value) -> Result<(), PvError> + Send + Sync + 'static,
    {
        self.on_write = Some(Box::new(handler));
        self
    }
    /// Make this an action: an output confirmed by a feedback PV
    pub fn action(mut self) -> Self {
        self.direction = DataDirection::Output;
        self.action = true;
        self
    }

    pub fn build(self) -> Arc<Variable> {
        let value = self
            .initial_value
            .and_then(|v| v.convert_to(self.data_type).ok())
            .unwrap_or_else(|| Value::default_for(self.data_type));
        let component = self.component.unwrap_or_else(|| {
            self.name
                .rsplit('-')
                .next()
                .unwrap_or(&self.name)
                .to_owned()
        });
        Arc::new(Variable {
            external_name: self.external_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            port: self.port,
            component,
            description: self.description,
            direction: self.direction,
            data_type: self.data_type,
            enumerations: self.enumerations,
            scan: self.scan,
            max_elements: self.max_elements,
            process_at_init: self.process_at_init,
            state: Mutex::new(State {
                value,
                timestamp: UnixTime::default(),
            }),
            interface: Mutex::new(None),
            on_write: self.on_write,
            acknowledge: self.action.then(OnceLock::new),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_write_and_read() {
        let pv = VariableBuilder::new("DEV", "Gain", DataType::Float64)
            .output()
            .initial_value(1.5)
            .build();
        let mut timestamp = UnixTime::default();
        assert_eq!(pv.read(&mut timestamp).unwrap(), Value::Float64(1.5));
        assert!(timestamp.is_zero());

        let when = UnixTime::new(1_700_000_000, 5);
        pv.write(when, &Value::Int32(3)).unwrap();
        assert_eq!(pv.load(), (when, Value::Float64(3.0)));
    }

    #[test]
    fn inputs_are_read_only() {
        let pv = VariableBuilder::new("DEV", "Temp", DataType::Float64).build();
        assert_eq!(
            pv.write(UnixTime::default(), &Value::Float64(1.0)),
            Err(PvError::ReadOnly("Temp".to_string()))
        );
    }

    #[test]
    fn write_handler_can_refuse() {
        let pv = VariableBuilder::new("DEV", "Volts", DataType::Int32)
            .output()
            .on_write(|_, value| match value {
                Value::Int32(v) if *v > 10 => Err(PvError::runtime("Voltage too high")),
                _ => Ok(()),
            })
            .build();
        assert!(pv.write(UnixTime::default(), &Value::Int32(5)).is_ok());
        assert_eq!(
            pv.write(UnixTime::default(), &Value::Int32(50)),
            Err(PvError::runtime("Voltage too high"))
        );
        assert_eq!(pv.value(), Value::Int32(5));
    }

    #[test]
    fn feedback_names() {
        let action = VariableBuilder::new("DEV", "Node-Reset", DataType::Int32)
            .external_name("DEV-Node-Reset")
            .action()
            .build();
        assert!(action.action().is_some());
        assert_eq!(action.component_name(), "Reset");
        let feedback = Variable::feedback_for(&*action);
        assert_eq!(feedback.full_name_from_port(), "Node-Reset_r");
        assert_eq!(feedback.full_external_name(), "DEV-Node-Reset_r");
        assert_eq!(feedback.component_name(), "Reset_r");
        assert_eq!(feedback.description(), "Feedback for DEV-Node-Reset");
        assert_eq!(feedback.direction(), DataDirection::Input);
        assert_eq!(feedback.scan_type(), ScanType::Interrupt);
        assert!(feedback.action().is_none());
    }

    #[test]
    fn set_value_without_interface() {
        let pv = VariableBuilder::new("DEV", "Temp", DataType::Float64).build();
        assert!(matches!(
            pv.set_value(UnixTime::new(1_700_000_000, 0), 2.0),
            Err(InterfaceError::NotInitialized(_))
        ));
        // The value is still stored for later reads
        assert_eq!(pv.value(), Value::Float64(2.0));
        assert!(matches!(
            pv.acknowledge(UnixTime::default(), 1),
            Err(InterfaceError::NoAcknowledgePv(_))
        ));
    }
}
