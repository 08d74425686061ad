use bincode::{deserialize_from, serialize_into};
use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::dashboard::Dashboard;
use crate::error::Result;
use crate::reactive::OutputSet;
use crate::table::Metric;

/// The inputs a dashboard was showing and every output they produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedOutputs {
    pub last_date: Option<NaiveDate>,
    pub metric: Metric,
    pub countries: BTreeSet<String>,
    pub outputs: OutputSet,
}

impl SavedOutputs {
    pub fn capture(dashboard: &Dashboard) -> Result<Self> {
        Ok(SavedOutputs {
            last_date: dashboard.base().table.last_date(),
            metric: dashboard.metric()?,
            countries: dashboard.countries(),
            outputs: dashboard.outputs().as_ref().clone(),
        })
    }
}

pub fn write_outputs<W: Write>(saved: &SavedOutputs, writer: W) -> Result<()> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut writer = BufWriter::new(encoder);
    serialize_into(&mut writer, saved)?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .finish()?;
    Ok(())
}

pub fn read_outputs<R: Read>(reader: R) -> Result<SavedOutputs> {
    let mut reader = BufReader::new(GzDecoder::new(reader));
    Ok(deserialize_from(&mut reader)?)
}

/// Gzip-compressed bincode, as served by the export endpoint.
pub fn to_bytes(saved: &SavedOutputs) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    write_outputs(saved, &mut bytes)?;
    Ok(bytes)
}

pub fn from_bytes(bytes: &[u8]) -> Result<SavedOutputs> {
    read_outputs(bytes)
}

pub fn save_outputs(saved: &SavedOutputs, path: impl AsRef<Path>) -> Result<()> {
    write_outputs(saved, File::create(path)?)
}

pub fn load_outputs(path: impl AsRef<Path>) -> Result<SavedOutputs> {
    read_outputs(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{LINE_COUNTRY_DAILY, PIE_TOTAL};
    use crate::error::Error;
    use crate::table::{Observation, Table};

    fn dashboard() -> Dashboard {
        let day = |d| NaiveDate::from_ymd_opt(2020, 8, d).unwrap();
        let table = Table::new(vec![
            Observation::new("Qatar", "Asia", day(1), 10, 1, 2e6),
            Observation::new("Qatar", "Asia", day(2), 12, 0, 2e6),
            Observation::new("Italy", "Europe", day(2), 50, 5, 6e7),
        ])
        .unwrap();
        Dashboard::new(table, Metric::DeathsPerMillion, ["Qatar".to_string()].into()).unwrap()
    }

    #[test]
    fn file_snapshot_restores_outputs() {
        let dashboard = dashboard();
        let saved = SavedOutputs::capture(&dashboard).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs.bin.gz");

        save_outputs(&saved, &path).unwrap();
        let loaded = load_outputs(&path).unwrap();

        assert_eq!(loaded.metric, Metric::DeathsPerMillion);
        assert_eq!(loaded.outputs[PIE_TOTAL], saved.outputs[PIE_TOTAL]);
        assert_eq!(loaded.outputs[LINE_COUNTRY_DAILY].groups(), vec!["Qatar".to_string()]);
    }

    #[test]
    fn in_memory_bytes_are_gzip() {
        let saved = SavedOutputs::capture(&dashboard()).unwrap();
        let bytes = to_bytes(&saved).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(from_bytes(&bytes).unwrap(), saved);
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let err = from_bytes(b"not a snapshot").unwrap_err();
        assert!(matches!(err, Error::Snapshot(_) | Error::Io(_)));
    }
}
