//! Reading and writing scenarios and run outputs.
//!
//! Files are written either as pretty JSON or as MessagePack. Loading tries JSON first and falls
//! back to MessagePack, so callers never need to say which one a file is.

use rmp_serde::{decode, encode};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use thiserror::Error;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    node::stats::NodeReport,
    simulation::data_structs::{LogItem, Transmission},
};

#[derive(Debug, Error)]
pub enum SimFileError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    RMPWriteError(#[from] encode::Error),
    #[error(transparent)]
    RMPReadError(#[from] decode::Error),
}

pub fn load_file<T>(path: impl AsRef<Path>) -> Result<T, SimFileError>
where
    T: DeserializeOwned,
{
    use serde_json::error::Category;

    let path = path.as_ref();
    let file = File::open(path)?;
    let buf_reader = BufReader::new(file);

    let json_result: Result<T, _> = serde_json::from_reader(buf_reader);

    json_result.or_else(|err| match err.classify() {
        Category::Io | Category::Eof => Err(err.into()),
        _ => {
            let file = File::open(path)?;
            let buf_reader = BufReader::new(file);
            let res: Result<T, _> = decode::from_read(buf_reader);
            res.map_err(|x| x.into())
        }
    })
}

pub fn write_file<T>(path: impl AsRef<Path>, object: &T, use_rmp: bool) -> Result<(), SimFileError>
where
    T: Serialize,
{
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);

    if use_rmp {
        encode::write(&mut buf, object)?;
    } else {
        serde_json::to_writer_pretty(buf, object)?;
    }

    Ok(())
}

/// Everything needed to run the same simulation again, given the scenario file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputIdentity {
    pub scenario_name: String,
    pub simulation_seed: u64,
    pub sim_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimOutput {
    // Data values
    pub reports: Vec<NodeReport>,
    pub logs: Vec<LogItem>,
    pub transmissions: Vec<Transmission>,

    // Regeneration
    pub complete_identity: OutputIdentity,
}
