//! Thin wrappers around `bio::io::fasta` for streaming records in and
//! masked/annotated records out, per SPEC_FULL §3.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use bio::io::fasta;

use crate::errors::Error;

/// One FASTA record, decoupled from `bio`'s borrowed `Record` so a whole
/// file's worth can be collected before processing in parallel.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl Record {
    /// The first whitespace-delimited word of the header, matching
    /// `tantan_app.cc`'s `firstWord`, which is what gets reported as the
    /// sequence name in BED/repeat/probability output.
    pub fn name(&self) -> &str {
        self.id.as_str()
    }
}

fn open_reader(path: Option<&Path>) -> Result<Box<dyn BufRead>, Error> {
    match path {
        Some(p) => {
            let file = File::open(p).map_err(|e| Error::InvalidConfig { path: p.to_owned(), msg: e.to_string() })?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Reads every record out of `path` (or STDIN when `None`) eagerly, so
/// records can subsequently be processed with `rayon`.
pub fn read_records(path: Option<&Path>) -> Result<Vec<Record>, Error> {
    let reader = fasta::Reader::new(open_reader(path)?);
    let path_for_errors = path.map(PathBuf::from).unwrap_or_default();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::InvalidConfig { path: path_for_errors.clone(), msg: e.to_string() })?;
        if record.seq().is_empty() {
            return Err(Error::EmptyRecord { name: record.id().to_owned(), path: path_for_errors });
        }
        records.push(Record {
            id: record.id().to_owned(),
            desc: record.desc().map(str::to_owned),
            seq: record.seq().to_vec(),
        });
    }
    Ok(records)
}

pub fn write_record(out: &mut impl Write, record: &Record) -> io::Result<()> {
    let mut writer = fasta::Writer::new(out);
    writer.write(&record.id, record.desc.as_deref(), &record.seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_records_round_trips_sequence_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">chr1 a test sequence\nACGTACGT").unwrap();
        let records = read_records(Some(file.path())).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "chr1");
        assert_eq!(records[0].seq, b"ACGTACGT");
    }

    #[test]
    fn test_empty_record_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">empty\n>next\nACGT").unwrap();
        let err = read_records(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::EmptyRecord { .. }));
    }
}
