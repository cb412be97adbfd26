//! Read and write entry points called by the asyn port.
//!
//! Every entry point finds the PV by the reason on the [`AsynUser`]. Failures
//! raised by the PV are never propagated: the message is interned, attached
//! to the user, and `AsynStatus::Error` returned. Only a timestamp that cannot
//! be expressed in the EPICS epoch escapes a read, as a
//! [`TimeConversionError`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    asyn::{AsynLink, AsynStatus, AsynUser, LinkError},
    interface::{EpicsInterface, InterfaceError},
    pv::{ProcessVariable, PvError},
    registry::Reason,
    time::{EpicsTimeStamp, TimeConversionError, UnixTime},
    utils::get_default_link_timeout,
    value::{ConversionError, NativeElement, NativeScalar},
};

#[derive(Debug, Error)]
enum DispatchError {
    #[error("No PV is registered with reason {0}")]
    UnknownReason(Reason),
    #[error("No PV named '{0}'")]
    UnknownName(String),
    #[error(transparent)]
    Pv(#[from] PvError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl EpicsInterface {
    fn pv_for(&self, user: &AsynUser) -> Result<Arc<dyn ProcessVariable>, DispatchError> {
        self.registry
            .read()
            .get(user.reason)
            .cloned()
            .ok_or(DispatchError::UnknownReason(user.reason))
    }

    fn fail(&self, user: &mut AsynUser, error: DispatchError) -> AsynStatus {
        let message = self.errors.intern(&error.to_string());
        debug!("Request on reason {} failed: {message}", user.reason);
        user.set_error(message);
        AsynStatus::Error
    }

    /// Mark `user` as served, dropping any error left by an earlier request
    fn succeed(user: &mut AsynUser) -> AsynStatus {
        user.clear_error();
        user.aux_status = AsynStatus::Success;
        AsynStatus::Success
    }

    fn read_one_value<T: NativeScalar>(
        &self,
        user: &mut AsynUser,
        value: &mut T,
    ) -> Result<AsynStatus, TimeConversionError> {
        let mut timestamp = UnixTime::from(user.timestamp);
        let read = self.pv_for(user).and_then(|pv| {
            let read = pv.read(&mut timestamp)?;
            Ok(T::extract(&read)?)
        });
        match read {
            Ok(read) => {
                user.timestamp = EpicsTimeStamp::try_from(timestamp)?;
                *value = read;
                Ok(Self::succeed(user))
            }
            Err(e) => Ok(self.fail(user, e)),
        }
    }

    fn write_one_value<T: NativeScalar>(&self, user: &mut AsynUser, value: T) -> AsynStatus {
        let timestamp = UnixTime::from(user.timestamp);
        let written = self.pv_for(user).and_then(|pv| {
            let value = value.into_value().convert_to(pv.data_type())?;
            Ok(pv.write(timestamp, &value)?)
        });
        match written {
            Ok(()) => Self::succeed(user),
            Err(e) => self.fail(user, e),
        }
    }

    fn read_array<T: NativeElement>(
        &self,
        user: &mut AsynUser,
        buffer: &mut [T],
        n_in: &mut usize,
    ) -> Result<AsynStatus, TimeConversionError> {
        *n_in = 0;
        let mut timestamp = UnixTime::from(user.timestamp);
        let read = self.pv_for(user).and_then(|pv| {
            let read = pv.read(&mut timestamp)?;
            Ok(T::extract(&read)?)
        });
        let values = match read {
            Ok(values) => values,
            Err(e) => return Ok(self.fail(user, e)),
        };
        let count = values.len().min(buffer.len());
        if count < values.len() {
            trace!(
                "Truncated read of reason {} from {} to {count} elements",
                user.reason,
                values.len()
            );
        }
        buffer[..count].copy_from_slice(&values[..count]);
        user.timestamp = EpicsTimeStamp::try_from(timestamp)?;
        *n_in = count;
        Ok(Self::succeed(user))
    }

    fn write_array<T: NativeElement>(&self, user: &mut AsynUser, values: &[T]) -> AsynStatus {
        let timestamp = UnixTime::from(user.timestamp);
        let written = self.pv_for(user).and_then(|pv| {
            let value = T::into_value(values.to_vec()).convert_to(pv.data_type())?;
            Ok(pv.write(timestamp, &value)?)
        });
        match written {
            Ok(()) => Self::succeed(user),
            Err(e) => self.fail(user, e),
        }
    }

    pub fn read_int32(
        &self,
        user: &mut AsynUser,
        value: &mut i32,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_one_value(user, value)
    }

    pub fn write_int32(&self, user: &mut AsynUser, value: i32) -> AsynStatus {
        self.write_one_value(user, value)
    }

    pub fn read_float64(
        &self,
        user: &mut AsynUser,
        value: &mut f64,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_one_value(user, value)
    }

    pub fn write_float64(&self, user: &mut AsynUser, value: f64) -> AsynStatus {
        self.write_one_value(user, value)
    }

    /// Read into `buffer`, setting `n_in` to the number of elements delivered.
    ///
    /// Longer PV values are silently truncated to the buffer.
    pub fn read_int8_array(
        &self,
        user: &mut AsynUser,
        buffer: &mut [i8],
        n_in: &mut usize,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_array(user, buffer, n_in)
    }

    pub fn write_int8_array(&self, user: &mut AsynUser, values: &[i8]) -> AsynStatus {
        self.write_array(user, values)
    }

    pub fn read_int16_array(
        &self,
        user: &mut AsynUser,
        buffer: &mut [i16],
        n_in: &mut usize,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_array(user, buffer, n_in)
    }

    pub fn write_int16_array(&self, user: &mut AsynUser, values: &[i16]) -> AsynStatus {
        self.write_array(user, values)
    }

    pub fn read_int32_array(
        &self,
        user: &mut AsynUser,
        buffer: &mut [i32],
        n_in: &mut usize,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_array(user, buffer, n_in)
    }

    pub fn write_int32_array(&self, user: &mut AsynUser, values: &[i32]) -> AsynStatus {
        self.write_array(user, values)
    }

    pub fn read_float32_array(
        &self,
        user: &mut AsynUser,
        buffer: &mut [f32],
        n_in: &mut usize,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_array(user, buffer, n_in)
    }

    pub fn write_float32_array(&self, user: &mut AsynUser, values: &[f32]) -> AsynStatus {
        self.write_array(user, values)
    }

    pub fn read_float64_array(
        &self,
        user: &mut AsynUser,
        buffer: &mut [f64],
        n_in: &mut usize,
    ) -> Result<AsynStatus, TimeConversionError> {
        self.read_array(user, buffer, n_in)
    }

    pub fn write_float64_array(&self, user: &mut AsynUser, values: &[f64]) -> AsynStatus {
        self.write_array(user, values)
    }

    /// Bind `user` to the PV named `drv_info`, by linear search
    pub fn drv_user_create(&self, user: &mut AsynUser, drv_info: &str) -> AsynStatus {
        let found = self
            .registry
            .read()
            .find_by_name(drv_info)
            .map(|(reason, pv)| (reason, pv.clone()));
        match found {
            Some((reason, pv)) => {
                trace!("Bound {drv_info} to reason {reason}");
                user.reason = reason;
                user.set_user_data(pv);
                Self::succeed(user)
            }
            None => self.fail(user, DispatchError::UnknownName(drv_info.to_owned())),
        }
    }

    /// Connect a record link to this port, as the IOC does at link time
    pub fn connect(&self, link: &AsynLink) -> Result<AsynUser, InterfaceError> {
        if link.port != self.driver.port_name() {
            return Err(LinkError::WrongPort {
                expected: self.driver.port_name().to_owned(),
                found: link.port.clone(),
            }
            .into());
        }
        let mut user = AsynUser::new(link.addr);
        user.timeout = link.timeout.unwrap_or_else(get_default_link_timeout);
        match self.drv_user_create(&mut user, &link.drv_info) {
            AsynStatus::Success => Ok(user),
            _ => Err(InterfaceError::NotRegistered(link.drv_info.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asyn::PortDriver,
        interface::{Interface, InterfaceBuilder},
        value::{DataType, Value},
        variable::VariableBuilder,
    };

    fn interface() -> Arc<EpicsInterface> {
        InterfaceBuilder::new(Arc::new(PortDriver::new("DEV"))).build()
    }

    #[test]
    fn scalar_round_trip() {
        let interface = interface();
        let pv = VariableBuilder::new("DEV", "Gain", DataType::Float64)
            .output()
            .build();
        interface.register_pv(pv.clone()).unwrap();
        let mut user = interface.connect(&"@asyn(DEV, 0)Gain".parse().unwrap()).unwrap();
        assert_eq!(user.user_data().unwrap().full_name_from_port(), "Gain");

        user.timestamp = EpicsTimeStamp::new(1_000_000_000, 500);
        assert_eq!(interface.write_int32(&mut user, 7), AsynStatus::Success);
        assert_eq!(pv.value(), Value::Float64(7.0));

        let mut read = 0.0;
        user.timestamp = EpicsTimeStamp::default();
        assert_eq!(interface.read_float64(&mut user, &mut read), Ok(AsynStatus::Success));
        assert_eq!(read, 7.0);
        assert_eq!(user.timestamp, EpicsTimeStamp::new(1_000_000_000, 500));
    }

    #[test]
    fn unknown_reason() {
        let interface = interface();
        let mut user = AsynUser::new(0);
        user.reason = 3;
        let mut value = 0;
        assert_eq!(interface.read_int32(&mut user, &mut value), Ok(AsynStatus::Error));
        assert_eq!(user.error_message(), Some("No PV is registered with reason 3"));
        assert_eq!(user.error_message_size(), user.error_message().unwrap().len());
    }

    #[test]
    fn string_through_char_waveform() {
        let interface = interface();
        let pv = VariableBuilder::new("DEV", "Serial", DataType::String)
            .max_elements(16)
            .initial_value("AB-12")
            .build();
        interface.register_pv(pv).unwrap();
        let mut user = interface.connect(&"@asyn(DEV, 0)Serial".parse().unwrap()).unwrap();
        let mut buffer = [0i8; 16];
        let mut n_in = 0;
        assert_eq!(
            interface.read_int8_array(&mut user, &mut buffer, &mut n_in),
            Ok(AsynStatus::Success)
        );
        assert_eq!(n_in, 5);
        assert_eq!(&buffer[..2], &[b'A' as i8, b'B' as i8]);
    }

    #[test]
    fn wrong_port_and_unknown_name() {
        let interface = interface();
        assert!(matches!(
            interface.connect(&AsynLink::new("OTHER", 0, "Gain")),
            Err(InterfaceError::Link(LinkError::WrongPort { .. }))
        ));
        assert!(matches!(
            interface.connect(&AsynLink::new("DEV", 0, "Gain")),
            Err(InterfaceError::NotRegistered(_))
        ));
    }
}
