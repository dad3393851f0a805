use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::plan::PlanReference;

#[derive(Debug, Error)]
pub enum WorklistError {
    #[error("Worklist header must start with MRN, found {0:?}")]
    InvalidHeader(String),

    #[error("Worklist is empty")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a worklist: a header line starting with `MRN`, then one
/// `patientId planId` pair per line.
///
/// Lines that are not valid UTF-8 or do not hold exactly two whitespace
/// separated tokens are logged and skipped.
///
/// # Errors
///
/// A missing or invalid header rejects the whole worklist
pub fn parse_worklist(reader: impl BufRead) -> Result<Vec<PlanReference>, WorklistError> {
    let mut lines = reader.split(b'\n');
    let header = lines.next().ok_or(WorklistError::Empty)??;
    let header = String::from_utf8_lossy(&header);
    let header = header.trim_end_matches('\r');
    if header.split_whitespace().next() != Some("MRN") {
        return Err(WorklistError::InvalidHeader(header.to_string()));
    }

    let mut references = Vec::new();
    for (number, line) in lines.enumerate() {
        let line = line?;
        let Ok(line) = std::str::from_utf8(&line) else {
            warn!(line = number + 2, "Non UTF-8 worklist entry skipped");
            continue;
        };
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [patient_id, plan_id] => references.push(PlanReference::new(*patient_id, *plan_id)),
            _ => warn!(line = number + 2, content = %line, "Invalid worklist entry skipped"),
        }
    }

    info!(patients = references.len(), "Worklist read");
    Ok(references)
}

pub fn read_worklist(path: impl AsRef<Path>) -> Result<Vec<PlanReference>, WorklistError> {
    let file = File::open(path.as_ref())?;
    parse_worklist(BufReader::new(file))
}
