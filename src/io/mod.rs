//! FASTA I/O (spec §9's glossary entry for "FASTA record"; SPEC_FULL §3).

pub mod fasta;

pub use fasta::{read_records, write_record, Record};
