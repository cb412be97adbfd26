use num::{FromPrimitive, traits::WrappingAdd};
use std::{env, path::PathBuf, time::Duration};

/// Increments a mutable reference in place, and returns the original value
pub(crate) fn wrapping_inplace_add<T: WrappingAdd + FromPrimitive + Copy>(value: &mut T) -> T {
    let id = *value;
    if let Some(one) = T::from_u8(1) {
        *value = value.wrapping_add(&one);
    }
    id
}

/// Directory for the generated record database, from environment or the system temp dir
pub fn get_default_database_dir() -> PathBuf {
    env::var_os("NDS_EPICS_DB_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
}

/// Default asyn link timeout, either from environment or 1 second
pub fn get_default_link_timeout() -> Duration {
    env::var("NDS_EPICS_LINK_TIMEOUT")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}
