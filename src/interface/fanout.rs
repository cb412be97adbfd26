//! Delivery of pushed values to interrupt subscribers.

use tracing::trace;

use crate::{
    asyn::{AsynStatus, InterruptList},
    interface::{EpicsInterface, InterfaceError, PORT_ADDRESS},
    pv::ProcessVariable,
    registry::Reason,
    time::{EpicsTimeStamp, UnixTime},
    value::{DataType, Value},
};

/// Call every subscriber on `list` bound to `reason` at the port address.
///
/// Returns the number of callbacks made.
pub(crate) fn fan_out<T: ?Sized>(
    list: &InterruptList<T>,
    reason: Reason,
    timestamp: EpicsTimeStamp,
    value: &T,
) -> usize {
    let mut pass = list.start();
    let mut notified = 0;
    for interrupt in pass.iter_mut() {
        if interrupt.user.reason != reason || interrupt.user.addr() != PORT_ADDRESS {
            continue;
        }
        interrupt.user.timestamp = timestamp;
        interrupt.user.aux_status = AsynStatus::Success;
        interrupt.call(value);
        notified += 1;
    }
    pass.end();
    notified
}

fn reinterpret_bytes(bytes: &[u8]) -> Vec<i8> {
    bytes.iter().map(|&b| b as i8).collect()
}

impl EpicsInterface {
    pub(crate) fn push_value(
        &self,
        pv: &dyn ProcessVariable,
        timestamp: UnixTime,
        value: &Value,
    ) -> Result<usize, InterfaceError> {
        let name = pv.full_name_from_port();
        let reason = self
            .reason_of(name)
            .ok_or_else(|| InterfaceError::NotRegistered(name.to_owned()))?;
        let value = value.convert_to(pv.data_type())?;
        let timestamp = EpicsTimeStamp::try_from(timestamp)?;

        let lists = self.driver.interrupts();
        let notified = match &value {
            Value::Int32(v) => fan_out(&lists.int32, reason, timestamp, v),
            Value::Float64(v) => fan_out(&lists.float64, reason, timestamp, v),
            Value::Int8Array(v) => fan_out(&lists.int8_array, reason, timestamp, v.as_slice()),
            Value::UInt8Array(v) => {
                fan_out(&lists.int8_array, reason, timestamp, &reinterpret_bytes(v)[..])
            }
            Value::String(v) => fan_out(
                &lists.int8_array,
                reason,
                timestamp,
                &reinterpret_bytes(v.as_bytes())[..],
            ),
            Value::Int16Array(v) => fan_out(&lists.int16_array, reason, timestamp, v.as_slice()),
            Value::Int32Array(v) => fan_out(&lists.int32_array, reason, timestamp, v.as_slice()),
            Value::Float64Array(v) => {
                fan_out(&lists.float64_array, reason, timestamp, v.as_slice())
            }
            Value::Float32Array(_) => {
                return Err(InterfaceError::NoInterruptCategory(DataType::Float32Array));
            }
        };
        trace!("Pushed {name} (reason {reason}) to {notified} subscribers");
        Ok(notified)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::asyn::AsynUser;

    fn subscriber(reason: Reason, addr: i32) -> AsynUser {
        let mut user = AsynUser::new(addr);
        user.reason = reason;
        user
    }

    #[test]
    fn only_matching_reason_and_address() {
        let list: InterruptList<f64> = InterruptList::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for (reason, addr) in [(5, 0), (5, 1), (6, 0)] {
            let calls = calls.clone();
            list.add(subscriber(reason, addr), move |user, value: &f64| {
                calls.lock().push((user.reason, user.addr(), *value, user.timestamp));
            });
        }
        let when = EpicsTimeStamp::new(100, 7);
        assert_eq!(fan_out(&list, 5, when, &23.5), 1);
        assert_eq!(*calls.lock(), vec![(5, 0, 23.5, when)]);
    }

    #[test]
    fn every_push_is_delivered() {
        let list: InterruptList<[i16]> = InterruptList::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        list.add(subscriber(0, 0), move |_, _| *counter.lock() += 1);
        for _ in 0..3 {
            fan_out(&list, 0, EpicsTimeStamp::default(), &[1i16, 1][..]);
        }
        assert_eq!(*calls.lock(), 3);
    }
}
