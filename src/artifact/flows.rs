//! Temporary flow table handed from the fetch stage to the wash-trading
//! detector.

use std::path::{Path, PathBuf};

use crate::artifact::write_atomically;
use crate::error::Result;
use crate::types::{Token, UserFlow};

pub fn temp_flows_path(dir: &Path, token: &Token) -> PathBuf {
    dir.join(format!("temp_{}_flows.csv", token.label()))
}

pub fn write_flows(path: &Path, flows: &[UserFlow]) -> Result<()> {
    write_atomically(path, |w| {
        let mut writer = csv::Writer::from_writer(w);
        for flow in flows {
            writer.serialize(flow)?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn read_flows(path: &Path) -> Result<Vec<UserFlow>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut flows = Vec::new();
    for row in rdr.deserialize::<UserFlow>() {
        flows.push(row?);
    }
    Ok(flows)
}
