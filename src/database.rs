//! Generation of EPICS database records for registered PVs.
//!
//! Every PV is exposed through one record whose type follows from its
//! direction, data type and whether it is enumerated:
//!
//! | direction | data                 | record            | DTYP                   |
//! |-----------|----------------------|-------------------|------------------------|
//! | input     | `Int32`              | `longin` / `mbbi` | `asynInt32`            |
//! | input     | `Float64`            | `ai`              | `asynFloat64`          |
//! | input     | arrays and strings   | `waveform`        | `asyn*ArrayIn`         |
//! | output    | `Int32`              | `longout`/ `mbbo` | `asynInt32`            |
//! | output    | `Float64`            | `ao`              | `asynFloat64`          |
//! | output    | arrays and strings   | `waveform`        | `asyn*ArrayOut`        |
//!
//! Waveforms also carry the element type in `FTVL`. Records address their PV
//! by name through an asyn link; asyn resolves the name to a reason when the
//! record is initialized.

use std::fmt::{self, Display};

use thiserror::Error;

use crate::{
    pv::{DataDirection, ProcessVariable, ScanType},
    value::DataType,
};

/// Prefixes of the `mbbi`/`mbbo` value and label fields, in state order
pub const ENUM_FIELD_PREFIXES: [&str; 16] = [
    "ZR", "ON", "TW", "TH", "FR", "FV", "SX", "SV", "EI", "NI", "TE", "EL", "TV", "TT", "FT", "FF",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Data type {0:?} cannot be exposed as an EPICS record")]
    UnsupportedDataType(DataType),
    #[error("{0} enumeration labels exceed the {max} states of a multi-bit record", max = ENUM_FIELD_PREFIXES.len())]
    TooManyEnumerations(usize),
}

/// Record type, asyn device type and waveform element type for a PV
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordDescription {
    pub record_type: &'static str,
    pub dtyp: &'static str,
    pub ftvl: Option<&'static str>,
}

impl RecordDescription {
    const fn new(record_type: &'static str, dtyp: &'static str, ftvl: Option<&'static str>) -> Self {
        Self {
            record_type,
            dtyp,
            ftvl,
        }
    }

    pub fn is_waveform(&self) -> bool {
        self.record_type == "waveform"
    }
}

/// Work out the record layout for a PV's static properties
pub fn describe(
    direction: DataDirection,
    data_type: DataType,
    enumerated: bool,
) -> Result<RecordDescription, ConfigurationError> {
    use DataDirection::{Input, Output};
    Ok(match (direction, data_type) {
        (Input, DataType::Int32) if enumerated => RecordDescription::new("mbbi", "asynInt32", None),
        (Input, DataType::Int32) => RecordDescription::new("longin", "asynInt32", None),
        (Input, DataType::Float64) => RecordDescription::new("ai", "asynFloat64", None),
        (Output, DataType::Int32) if enumerated => RecordDescription::new("mbbo", "asynInt32", None),
        (Output, DataType::Int32) => RecordDescription::new("longout", "asynInt32", None),
        (Output, DataType::Float64) => RecordDescription::new("ao", "asynFloat64", None),
        (direction, data_type) => {
            let (interface, ftvl) = match data_type {
                DataType::Int8Array | DataType::String => ("asynInt8Array", "CHAR"),
                DataType::UInt8Array => ("asynInt8Array", "UCHAR"),
                DataType::Int16Array => ("asynInt16Array", "SHORT"),
                DataType::Int32Array => ("asynInt32Array", "LONG"),
                DataType::Float64Array => ("asynFloat64Array", "DOUBLE"),
                DataType::Int32 | DataType::Float64 | DataType::Float32Array => {
                    return Err(ConfigurationError::UnsupportedDataType(data_type));
                }
            };
            let dtyp = match (interface, direction) {
                ("asynInt8Array", Input) => "asynInt8ArrayIn",
                ("asynInt8Array", Output) => "asynInt8ArrayOut",
                ("asynInt16Array", Input) => "asynInt16ArrayIn",
                ("asynInt16Array", Output) => "asynInt16ArrayOut",
                ("asynInt32Array", Input) => "asynInt32ArrayIn",
                ("asynInt32Array", Output) => "asynInt32ArrayOut",
                (_, Input) => "asynFloat64ArrayIn",
                (_, Output) => "asynFloat64ArrayOut",
            };
            RecordDescription::new("waveform", dtyp, Some(ftvl))
        }
    })
}

/// Value of a record field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Written as a double-quoted, escaped string
    Quoted(String),
    /// Written as-is, for numbers
    Bare(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub record_type: String,
    pub name: String,
    pub fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new(record_type: &str, name: &str) -> Self {
        Record {
            record_type: record_type.to_owned(),
            name: name.to_owned(),
            fields: Vec::new(),
        }
    }

    pub fn quoted(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields
            .push((field.to_owned(), FieldValue::Quoted(value.into())));
        self
    }

    pub fn bare(mut self, field: &str, value: impl Display) -> Self {
        self.fields
            .push((field.to_owned(), FieldValue::Bare(value.to_string())));
        self
    }

    /// Look up the value of a field by name
    pub fn field(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "record({}, \"{}\") {{", self.record_type, escape(&self.name))?;
        for (name, value) in &self.fields {
            match value {
                FieldValue::Quoted(v) => writeln!(f, "    field({name}, \"{}\")", escape(v))?,
                FieldValue::Bare(v) => writeln!(f, "    field({name}, {v})")?,
            }
        }
        writeln!(f, "}}")?;
        writeln!(f)
    }
}

/// Text of the `SCAN` field
pub fn scan_field(scan: &ScanType) -> String {
    match scan {
        ScanType::Passive => "Passive".to_string(),
        ScanType::Periodic { seconds } => format!("{seconds} second"),
        ScanType::Interrupt => "I/O Intr".to_string(),
    }
}

/// Text of an asyn `INP`/`OUT` link
pub fn asyn_link(port: &str, address: i32, name: &str) -> String {
    format!("@asyn({port}, {address}){name}")
}

/// Build the record exposing `pv`, addressed through `address` on its port
pub fn pv_record(pv: &dyn ProcessVariable, address: i32) -> Result<Record, ConfigurationError> {
    let enumerations = pv.enumerations();
    let description = describe(pv.direction(), pv.data_type(), !enumerations.is_empty())?;
    let multi_bit = matches!(description.record_type, "mbbi" | "mbbo");
    if multi_bit && enumerations.len() > ENUM_FIELD_PREFIXES.len() {
        return Err(ConfigurationError::TooManyEnumerations(enumerations.len()));
    }

    let mut record = Record::new(description.record_type, pv.full_external_name())
        .quoted("DESC", pv.description())
        .quoted("DTYP", description.dtyp);
    if let Some(ftvl) = description.ftvl {
        record = record.quoted("FTVL", ftvl);
    }
    if pv.max_elements() > 1 {
        record = record.bare("NELM", pv.max_elements());
    }
    record = record.quoted("SCAN", scan_field(&pv.scan_type()));

    // Waveforms are always linked through INP, even when written to
    let link = asyn_link(pv.port_full_name(), address, pv.full_name_from_port());
    record = if pv.direction() == DataDirection::Input || description.is_waveform() {
        record.quoted("INP", link)
    } else {
        record.quoted("OUT", link)
    };

    if multi_bit {
        for (index, (label, prefix)) in enumerations.iter().zip(ENUM_FIELD_PREFIXES).enumerate() {
            record = record
                .bare(&format!("{prefix}VL"), index)
                .quoted(&format!("{prefix}ST"), label.as_str());
        }
    }
    Ok(record)
}

/// Records relaying an action's acknowledgement back into the action record.
///
/// The feedback record `<name>_r` forward-links to a `calcout` `<name>_c`
/// that copies the acknowledged value into the action record.
pub fn action_relay_records(external_name: &str) -> [Record; 2] {
    let feedback = format!("{external_name}_r");
    let calculation = format!("{external_name}_c");
    [
        Record::new("longin", &feedback).quoted("FLNK", calculation.as_str()),
        Record::new("calcout", &calculation)
            .quoted("DESC", format!("Calculation for {external_name}"))
            .quoted("SCAN", "Passive")
            .quoted("INPA", feedback)
            .quoted("CALC", "A")
            .quoted("OOPT", "Every Time")
            .quoted("OUT", external_name),
    ]
}
